//! Codec module - serialization of telemetry payloads.
//!
//! This module provides the payload encodings carried inside logical messages:
//!
//! - [`MsgPackCodec`] - compact binary MessagePack using `rmp-serde` (default)
//! - [`JsonCodec`] - JSON text using `serde_json`
//!
//! Only the payload changes between formats; the frame header is always binary.
//! Both ends of a link must use the same [`PayloadFormat`].
//!
//! # Example
//!
//! ```
//! use lora_telemetry::codec::PayloadFormat;
//!
//! let format = PayloadFormat::default();
//! let encoded = format.encode(&(1u32, "hello")).unwrap();
//! let decoded: (u32, String) = format.decode(&encoded).unwrap();
//! assert_eq!(decoded, (1, "hello".to_string()));
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use std::fmt;

use crate::error::Result;

/// Payload encoding selected for a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Binary MessagePack with positional structs.
    #[default]
    MsgPack,
    /// JSON text, matching the JSON-speaking ground scripts.
    Json,
}

impl PayloadFormat {
    /// Encode a value in this format.
    #[inline]
    pub fn encode<T: serde::Serialize>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            PayloadFormat::MsgPack => MsgPackCodec::encode(value),
            PayloadFormat::Json => JsonCodec::encode(value),
        }
    }

    /// Decode a value from this format.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            PayloadFormat::MsgPack => MsgPackCodec::decode(bytes),
            PayloadFormat::Json => JsonCodec::decode(bytes),
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::MsgPack => f.write_str("msgpack"),
            PayloadFormat::Json => f.write_str("json"),
        }
    }
}
