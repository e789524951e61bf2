use std::sync::Arc;
use tokio::sync::Mutex;

use crate::coordinator::Coordinator;
use crate::link::ChannelLink;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    // Registry and sync round; one lock per inbound event.
    pub coordinator: Mutex<Coordinator<ChannelLink>>,
}

impl AppState {
    pub fn new() -> SharedState {
        Arc::new(Self {
            coordinator: Mutex::new(Coordinator::new()),
        })
    }
}
