//! Pluggable encoding of typed results into the bytes [`crate::storage::Storage`]
//! persists.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{IdempotencyError, Result};

/// Converts a typed value to and from the byte representation stored
/// alongside a [`crate::record::Record`].
pub trait Serializer: Send + Sync {
    /// Encode `value` to bytes.
    fn encode<T: Serialize>(&self, key: &str, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes back to `T`.
    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T>;
}

/// Default [`Serializer`] using `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode<T: Serialize>(&self, key: &str, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| IdempotencyError::SerializationFailure { key: key.to_string(), reason: e.to_string() })
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| IdempotencyError::SerializationFailure { key: key.to_string(), reason: e.to_string() })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // tests favor unwrap over explicit error handling
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        id: u32,
        name: String,
    }

    #[test]
    fn json_round_trips() {
        let serializer = JsonSerializer;
        let value = Payload { id: 7, name: "widget".to_string() };
        let bytes = serializer.encode("k1", &value).unwrap();
        let decoded: Payload = serializer.decode("k1", &bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_error_is_serialization_failure() {
        let serializer = JsonSerializer;
        let err = serializer.decode::<Payload>("k1", b"not json").unwrap_err();
        assert_eq!(err.code(), crate::error::IdempotencyErrorCode::SerializationFailure);
    }
}
