pub mod app_state;
pub mod barrier;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod handlers;
pub mod link;
pub mod routes;

use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use app_state::{AppState, SharedState};
pub use config::Config;
pub use coordinator::Coordinator;

pub async fn run(config: Config, app_state: SharedState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server is listening on {}", addr);

    if let Some(period) = config.sync_interval {
        spawn_sync_ticker(app_state.clone(), period);
    }

    serve(listener, app_state).await
}

pub async fn serve(listener: TcpListener, app_state: SharedState) -> anyhow::Result<()> {
    let app = routes::create_router(app_state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Starts a sync round every `period` while at least one slave is connected.
pub fn spawn_sync_ticker(app_state: SharedState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; new slaves already trigger a round.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let mut coordinator = app_state.coordinator.lock().await;
            if coordinator.session_count() > 0 {
                coordinator.yik();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ChannelLink;
    use lockstep_core::Command;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_ticker_polls_connected_slaves() {
        let state = AppState::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.coordinator.lock().await.register(ChannelLink::new(tx));
        while rx.try_recv().is_ok() {}

        let ticker = spawn_sync_ticker(state.clone(), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(5_100)).await;

        let frame = rx.try_recv().unwrap();
        assert_eq!(Command::decode(&frame).unwrap(), Command::RequestPosition);
        assert!(rx.try_recv().is_err());
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_is_quiet_without_slaves() {
        let state = AppState::new();
        let ticker = spawn_sync_ticker(state.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(!state.coordinator.lock().await.round_pending());
        ticker.abort();
    }
}
