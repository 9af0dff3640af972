//! Typed error handling for destination connectors.
//!
//! Delivery failures themselves are not errors here: they travel inside a
//! [`Response`](courier_common::Response) with an `ERROR` status and are
//! retried according to policy. What remains are the conditions that stop
//! the current unit of work:
//! - Cancellation - cooperative, unwinds silently
//! - Connector defects - a send that produced no response at all
//! - Persistence and codec failures - roll back and try again later
//! - Lifecycle failures - the connector couldn't start or stop cleanly

use courier_common::{ChannelState, ContentType, MessageKey};
use courier_store::{CodecError, StoreError};
use thiserror::Error;

/// Top-level connector error type.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The work was cancelled; not a failure.
    #[error("Cancelled")]
    Cancelled,

    /// The destination's send produced no response, which is a bug in the connector.
    #[error("Received no response from destination {destination}")]
    NoResponse { destination: String },

    /// Content the operation depends on was never stored.
    #[error("No {content_type:?} content stored for {key}")]
    MissingContent {
        key: MessageKey,
        content_type: ContentType,
    },

    /// Persistence failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Encoding or decoding stored content failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The connector failed to start.
    #[error("Failed to start destination connector for channel {channel_id}: {source}")]
    Start {
        channel_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The connector failed to stop.
    #[error("Failed to stop destination connector for channel {channel_id}: {source}")]
    Stop {
        channel_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The operation isn't possible in the connector's current state.
    #[error("Cannot {operation} destination connector while {state}")]
    InvalidState {
        operation: &'static str,
        state: ChannelState,
    },
}

impl ConnectorError {
    /// Returns `true` if this error only signals cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A response transformer failed.
///
/// Carried back to the connector as a value; it becomes the response's error
/// and is appended to the message's errors rather than propagating further.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
    /// Extra detail about where the transformer failed
    pub detail: Option<String>,
}

impl TransformError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// The error as recorded against the message
    #[must_use]
    pub fn formatted(&self) -> String {
        match &self.detail {
            Some(detail) => format!("RESPONSE TRANSFORMER ERROR: {}\n{detail}", self.message),
            None => format!("RESPONSE TRANSFORMER ERROR: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancelled() {
        assert!(ConnectorError::Cancelled.is_cancelled());
        assert!(
            !ConnectorError::NoResponse {
                destination: "dest".to_string()
            }
            .is_cancelled()
        );
    }

    #[test]
    fn test_error_display() {
        let error = ConnectorError::NoResponse {
            destination: "HL7 Out".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Received no response from destination HL7 Out"
        );

        let error = ConnectorError::InvalidState {
            operation: "start",
            state: ChannelState::Started,
        };
        assert_eq!(
            error.to_string(),
            "Cannot start destination connector while STARTED"
        );

        let error = ConnectorError::Store(StoreError::Closed);
        assert_eq!(error.to_string(), "Store error: Transaction already closed");
    }

    #[test]
    fn test_transform_error_formatting() {
        assert_eq!(
            TransformError::new("bad field").formatted(),
            "RESPONSE TRANSFORMER ERROR: bad field"
        );
        assert_eq!(
            TransformError::new("bad field")
                .with_detail("at line 3")
                .formatted(),
            "RESPONSE TRANSFORMER ERROR: bad field\nat line 3"
        );
    }
}
