//! Error types for lora-telemetry.

use thiserror::Error;

use crate::protocol::{FrameError, MessageKind};
use crate::transport::RadioError;

/// Main error type for all link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error on a socket or sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Radio driver error.
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    /// Frame failed to encode or decode.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Payload needs more fragments than the header can address.
    #[error("message {seq} of {len} bytes needs {fragments} fragments, maximum is {max_fragments}")]
    MessageTooLarge {
        seq: u32,
        len: usize,
        fragments: usize,
        max_fragments: usize,
    },

    /// A frame exhausted its retries and was dropped.
    #[error("frame {frag_index} of message {seq} dropped after {attempts} attempts")]
    LinkSendFailed {
        seq: u32,
        frag_index: u16,
        attempts: u32,
    },

    /// A reassembled payload does not decode as its declared kind.
    #[error("malformed {kind} payload in message {seq}: {reason}")]
    MalformedPayload {
        seq: u32,
        kind: MessageKind,
        reason: String,
    },

    /// An incomplete buffer timed out.
    #[error("{kind} message {seq} expired with {received} of {frag_count} fragments")]
    ReassemblyExpired {
        seq: u32,
        kind: MessageKind,
        received: u16,
        frag_count: u16,
    },

    /// Reassembly buffer limit reached; new sequence numbers are refused.
    #[error("reassembly capacity of {limit} buffers exhausted")]
    CapacityExhausted { limit: usize },

    /// Bulk queue is full.
    #[error("Queue full")]
    QueueFull,

    /// Link or receive task is gone.
    #[error("Channel closed")]
    ChannelClosed,

    /// A runtime task panicked or was cancelled.
    #[error("task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

impl LinkError {
    /// Whether this error affects only one frame or message.
    ///
    /// Local errors are counted and logged; the link keeps running.
    pub fn is_local(&self) -> bool {
        !matches!(
            self,
            LinkError::Io(_)
                | LinkError::ChannelClosed
                | LinkError::TaskFailed(_)
                | LinkError::Radio(RadioError::Closed)
        )
    }
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
