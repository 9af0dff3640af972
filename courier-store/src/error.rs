//! Error types for the courier-store crate.

use courier_common::MessageKey;
use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Encoding or decoding a stored payload failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The message isn't known to the store.
    #[error("Message not found: {0}")]
    NotFound(MessageKey),

    /// The transaction was already closed.
    #[error("Transaction already closed")]
    Closed,

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (lock poisoning, invariant violations, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let store_err: StoreError = io_err.into();

        assert!(matches!(store_err, StoreError::Io(_)));
        assert!(store_err.to_string().contains("access denied"));
    }

    #[test]
    fn test_not_found_display() {
        let key = MessageKey {
            channel_id: "channel".to_string(),
            message_id: 4,
            meta_data_id: 1,
        };

        assert_eq!(
            StoreError::NotFound(key).to_string(),
            "Message not found: channel/4/1"
        );
    }
}
