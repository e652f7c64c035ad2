//! MsgPack codec using `rmp-serde`.
//!
//! Uses `to_vec`, which serializes structs as arrays (positional). Field
//! names never cross the radio link, so both ends must share the same struct
//! definitions.
//!
//! # Example
//!
//! ```
//! use lora_telemetry::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Reading {
//!     id: u32,
//!     volts: f32,
//! }
//!
//! let reading = Reading { id: 42, volts: 11.9 };
//! let encoded = MsgPackCodec::encode(&reading).unwrap();
//! let decoded: Reading = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, reading);
//! ```

use crate::error::Result;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
