use std::time::Duration;

use clap::Parser;
use lockstep_client::{Control, RetryPolicy, SimulatedPlayer, SyncAgent, WsLink};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "lockstep-client")]
#[command(about = "Headless display that plays in lock-step with a coordinator")]
struct Cli {
    /// Coordinator WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:1337/ws")]
    url: Url,

    /// Length of the simulated video
    #[arg(long, default_value_t = 120.0)]
    duration_secs: f64,

    /// How long the simulated video takes to load its metadata
    #[arg(long, default_value_t = 500)]
    load_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockstep_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if !(cli.duration_secs.is_finite() && cli.duration_secs > 0.0) {
        anyhow::bail!("--duration-secs must be a positive number");
    }

    let (link_tx, link_events) = mpsc::unbounded_channel();
    let link = WsLink::new(cli.url.clone(), link_tx);
    let player = SimulatedPlayer::new(
        Duration::from_secs_f64(cli.duration_secs),
        Duration::from_millis(cli.load_delay_ms),
    );
    let (agent, scheduled) = SyncAgent::new(link, player, RetryPolicy::default());

    let (control_tx, controls) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Control>() {
                Ok(control) => {
                    if control_tx.send(control).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }
    });

    tracing::info!(
        "Following {} (controls: toggle, stop, seek [0-1], status)",
        cli.url
    );

    tokio::select! {
        _ = agent.run(link_events, controls, scheduled) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }
    Ok(())
}
