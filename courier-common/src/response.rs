use serde::{Deserialize, Serialize};

use crate::Status;

/// The outcome of delivering a message to a destination
///
/// Produced by a connector's send and possibly rewritten by a response
/// transformer, so its status is re-checked after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    /// What the destination replied with, if anything
    pub message: Option<String>,
    /// A short, human readable description of the status
    pub status_message: Option<String>,
    pub error: Option<String>,
}

impl Response {
    #[must_use]
    pub const fn new(status: Status) -> Self {
        Self {
            status,
            message: None,
            status_message: None,
            error: None,
        }
    }

    #[must_use]
    pub const fn sent() -> Self {
        Self::new(Status::Sent)
    }

    #[must_use]
    pub const fn queued() -> Self {
        Self::new(Status::Queued)
    }

    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(Status::Error)
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_status_message(mut self, status_message: impl Into<String>) -> Self {
        self.status_message = Some(status_message.into());
        self
    }

    /// The error text, when there is one worth recording
    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().filter(|error| !error.trim().is_empty())
    }
}
