//! Turning connector send parameters and responses into storable bytes

use serde::{Serialize, de::DeserializeOwned};

use crate::error::CodecError;

/// Serializes values to bytes for storage, and back
///
/// Decoding what was encoded must yield an equal value; retries of a queued
/// message depend on getting back exactly the parameters of the first attempt.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// If the value can't be represented by this codec
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// # Errors
    /// If `bytes` isn't a valid encoding of `T`
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// [`Codec`] backed by bincode's standard configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serde::encode_to_vec(
            value,
            bincode::config::standard(),
        )?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let (value, _read) =
            bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard())?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use courier_common::{Response, Status};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn response_survives_storage() -> Result<(), CodecError> {
        let codec = BincodeCodec;
        let response = Response::error("connection refused").with_status_message("refused");

        let bytes = codec.serialize(&response)?;
        let decoded: Response = codec.deserialize(&bytes)?;

        assert_eq!(decoded, response);
        assert_eq!(decoded.status, Status::Error);
        Ok(())
    }

    #[test]
    fn garbage_fails_to_decode() {
        let codec = BincodeCodec;
        let decoded = codec.deserialize::<Response>(&[0xff, 0xff, 0xff]);

        assert!(matches!(decoded, Err(CodecError::Decode(_))));
    }
}
