use thiserror::Error;

/// Lifecycle of a transport link, mirroring a WebSocket's ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Something that happened on a link, delivered to whoever owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Opened,
    Errored(String),
    MessageReceived(String),
    Closed,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link is not open ({0:?})")]
    NotOpen(LinkState),
}

/// A bidirectional text-frame channel between one client and the coordinator.
///
/// Links never retry on their own: a failed connection attempt shows up as
/// [`LinkEvent::Errored`] and it is up to the caller to `open` again.
pub trait Link {
    fn state(&self) -> LinkState;

    /// Establishes a connection, or reuses the current one. A closed
    /// connection is discarded and replaced.
    fn open(&mut self);

    /// Sends one frame. Only valid while the link is [`LinkState::Open`].
    fn send(&mut self, frame: String) -> Result<(), LinkError>;

    fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }
}
