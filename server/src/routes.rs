use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::app_state::SharedState;
use crate::{control, handlers};

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // Plain `ws://host:port` clients land on `/`.
        .route("/", get(handlers::ws_handler))
        .route("/ws", get(handlers::ws_handler))
        .route("/control", post(control::handle_control_command))
        .route("/status", get(control::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
