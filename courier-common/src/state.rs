use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Lifecycle of a destination connector
///
/// ```text
/// Stopped -> Starting -> Started -> Stopping -> Stopped
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum ChannelState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl ChannelState {
    /// The queue consumer keeps going only while the connector is coming up or up
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::Started)
    }
}

impl Display for ChannelState {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Stopping => "STOPPING",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ChannelState;

    #[test]
    fn running_states() {
        assert!(ChannelState::Starting.is_running());
        assert!(ChannelState::Started.is_running());
        assert!(!ChannelState::Stopping.is_running());
        assert!(!ChannelState::default().is_running());
    }
}
