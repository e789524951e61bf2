use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use lockstep_core::{Command, Link};
use serde::Deserialize;

use crate::app_state::SharedState;
use crate::coordinator::Coordinator;

/// Label used in logs for commands injected over REST.
const MASTER: &str = "master";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlCommand {
    Stop,
    Seek { value: f64 },
    Sync,
}

// Same path as a slave-originated command, minus the socket.
pub fn process_control_command<L: Link>(coordinator: &mut Coordinator<L>, cmd: ControlCommand) {
    let command = match cmd {
        ControlCommand::Stop => Command::Stop,
        ControlCommand::Seek { value } => Command::Seek(value),
        ControlCommand::Sync => Command::RequestPosition,
    };
    coordinator.handle_command(MASTER, command);
}

pub async fn handle_control_command(
    State(state): State<SharedState>,
    Json(cmd): Json<ControlCommand>,
) -> impl IntoResponse {
    tracing::info!("Control command: {:?}", cmd);
    let mut coordinator = state.coordinator.lock().await;
    process_control_command(&mut *coordinator, cmd);
    Json(coordinator.status())
}

pub async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.coordinator.lock().await.status())
}
