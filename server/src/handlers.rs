use crate::app_state::SharedState;
use crate::link::ChannelLink;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    tracing::info!("Client connecting: {}", addr);
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

pub async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // Everything addressed to this slave goes through the channel, so the
    // coordinator never awaits on a socket while holding its lock.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let session_id = state.coordinator.lock().await.register(ChannelLink::new(tx));

    let writer_id = session_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        tracing::debug!("[{}] writer stopped", writer_id);
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,

            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    state.coordinator.lock().await.handle_frame(&session_id, &text);
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => state.coordinator.lock().await.handle_frame(&session_id, &text),
                    Err(_) => tracing::warn!("[{}] dropped non-UTF-8 binary frame", session_id),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("[{}] connection error: {}", session_id, e);
                    break;
                }
            }
        }
    }

    writer.abort();
    state.coordinator.lock().await.unregister(&session_id);
    tracing::info!("Client disconnected: {} ({})", session_id, addr);
}
