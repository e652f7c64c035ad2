//! JSON codec using `serde_json`.

use crate::error::Result;

/// JSON text codec for payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Summary {
        min: f32,
        max: f32,
        mean: f32,
    }

    #[test]
    fn test_encode_is_named_and_compact() {
        let encoded = JsonCodec::encode(&Summary {
            min: 20.0,
            max: 40.5,
            mean: 28.0,
        })
        .unwrap();
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            r#"{"min":20.0,"max":40.5,"mean":28.0}"#
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result: Result<Summary> = JsonCodec::decode(b"{\"min\":");
        assert!(result.is_err());
    }
}
