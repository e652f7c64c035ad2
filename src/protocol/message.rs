//! Logical messages: one sampled record before fragmentation.

use bytes::Bytes;

use super::wire_format::MessageKind;

/// A logical message identified by its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMessage {
    /// Per-agent sequence number.
    pub seq: u32,
    /// Kind of payload.
    pub kind: MessageKind,
    /// Encoded payload bytes.
    pub payload: Bytes,
}

impl LogicalMessage {
    /// Create a new logical message.
    pub fn new(seq: u32, kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            seq,
            kind,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
