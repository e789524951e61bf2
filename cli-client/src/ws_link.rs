use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use lockstep_core::{Link, LinkError, LinkEvent, LinkState};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

/// One connection attempt and, once it succeeds, the socket behind it.
#[derive(Debug)]
struct Connection {
    inner: Mutex<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    state: LinkState,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

impl Connection {
    fn new() -> Self {
        Self {
            inner: Mutex::new(ConnectionInner {
                state: LinkState::Connecting,
                outbound: None,
            }),
        }
    }

    fn state(&self) -> LinkState {
        self.inner.lock().state
    }

    fn set_state(&self, state: LinkState) {
        let mut inner = self.inner.lock();
        inner.state = state;
        if state == LinkState::Closed {
            inner.outbound = None;
        }
    }

    fn opened(&self, outbound: mpsc::UnboundedSender<String>) {
        let mut inner = self.inner.lock();
        inner.state = LinkState::Open;
        inner.outbound = Some(outbound);
    }

    fn send(&self, frame: String) -> Result<(), LinkError> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.outbound) {
            (LinkState::Open, Some(outbound)) => outbound
                .send(frame)
                .map_err(|_| LinkError::NotOpen(LinkState::Closed)),
            (state, _) => Err(LinkError::NotOpen(*state)),
        }
    }
}

/// WebSocket link to the coordinator. Every connection attempt runs in its
/// own task and reports back through the event channel.
pub struct WsLink {
    url: Url,
    events: mpsc::UnboundedSender<LinkEvent>,
    current: Option<Arc<Connection>>,
}

impl WsLink {
    pub fn new(url: Url, events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self {
            url,
            events,
            current: None,
        }
    }
}

impl Link for WsLink {
    fn state(&self) -> LinkState {
        self.current
            .as_ref()
            .map_or(LinkState::Closed, |connection| connection.state())
    }

    fn open(&mut self) {
        if let Some(connection) = &self.current {
            if connection.state() != LinkState::Closed {
                return;
            }
            tracing::debug!("Discarding closed connection to {}", self.url);
        }

        let connection = Arc::new(Connection::new());
        self.current = Some(connection.clone());
        tokio::spawn(drive(self.url.clone(), connection, self.events.clone()));
    }

    fn send(&mut self, frame: String) -> Result<(), LinkError> {
        match &self.current {
            Some(connection) => connection.send(frame),
            None => Err(LinkError::NotOpen(LinkState::Closed)),
        }
    }
}

async fn drive(url: Url, connection: Arc<Connection>, events: mpsc::UnboundedSender<LinkEvent>) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            connection.set_state(LinkState::Closed);
            let _ = events.send(LinkEvent::Errored(e.to_string()));
            let _ = events.send(LinkEvent::Closed);
            return;
        }
    };

    let (mut write, mut read) = socket.split();
    let (outbound, mut frames) = mpsc::unbounded_channel::<String>();
    connection.opened(outbound);
    let _ = events.send(LinkEvent::Opened);

    loop {
        tokio::select! {
            Some(frame) = frames.recv() => {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    let _ = events.send(LinkEvent::Errored(e.to_string()));
                    break;
                }
            }

            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(LinkEvent::MessageReceived(text));
                }
                Some(Ok(Message::Close(_))) | None => {
                    connection.set_state(LinkState::Closing);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(LinkEvent::Errored(e.to_string()));
                    break;
                }
            }
        }
    }

    connection.set_state(LinkState::Closed);
    let _ = events.send(LinkEvent::Closed);
}
