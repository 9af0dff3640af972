pub mod logging;
pub mod message;
pub mod policy;
pub mod response;
pub mod state;
pub mod status;

pub use message::{ConnectorMessage, ContentType, MessageContent, MessageKey};
pub use policy::{QueueConnectorProperties, StorageSettings};
pub use response::Response;
pub use state::ChannelState;
pub use status::Status;
pub use tracing;

/// Signals broadcast to running destinations by whoever owns them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Let the current unit of work finish, then stop
    Shutdown,
    /// Cancel whatever is in flight and stop
    Halt,
}
