use lockstep_core::{Link, LinkError, LinkState};
use tokio::sync::mpsc;

/// Server side of a session's link: frames go into the channel drained by
/// the connection's WebSocket writer task. The link counts as open for as
/// long as that task is alive.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelLink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl Link for ChannelLink {
    fn state(&self) -> LinkState {
        if self.tx.is_closed() {
            LinkState::Closed
        } else {
            LinkState::Open
        }
    }

    // The client dials in; there is nothing to (re)open from this side.
    fn open(&mut self) {}

    fn send(&mut self, frame: String) -> Result<(), LinkError> {
        self.tx
            .send(frame)
            .map_err(|_| LinkError::NotOpen(LinkState::Closed))
    }
}
