pub mod agent;
pub mod control;
pub mod player;
pub mod ws_link;

pub use agent::{AgentState, RetryPolicy, Scheduled, SyncAgent};
pub use control::Control;
pub use player::{Actuator, SimulatedPlayer};
pub use ws_link::WsLink;
