pub mod link;
pub mod messages;

pub use link::{Link, LinkError, LinkEvent, LinkState};
pub use messages::{Command, ProtocolError};
