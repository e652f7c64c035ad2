//! Frame struct and the stateless frame codec.
//!
//! One frame is exactly one radio transmission: a 16-byte header followed by
//! `data_len` bytes of data. Uses `bytes::Bytes` so fragment data can be
//! sliced out of a logical message payload without copying.
//!
//! # Example
//!
//! ```
//! use lora_telemetry::protocol::{Frame, FrameCodec, MessageKind};
//! use bytes::Bytes;
//!
//! let codec = FrameCodec::new(32);
//! let frame = Frame::new(7, 0, 1, MessageKind::Telemetry, Bytes::from_static(b"hello"));
//! let wire = codec.encode(&frame).unwrap();
//! let decoded = codec.decode(wire).unwrap();
//!
//! assert_eq!(decoded, frame);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::wire_format::{Header, MessageKind, HEADER_SIZE};

/// Per-frame decoding and encoding failures.
///
/// All of these are local to one frame: the frame is discarded and nothing
/// else is affected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer bytes than the header, or than header plus declared data.
    #[error("frame too short: {actual} bytes, need {needed}")]
    TooShort { needed: usize, actual: usize },

    /// CRC over the data disagrees with the header. Header fields are intact.
    #[error("CRC mismatch on seq {seq} fragment {frag_index}: header {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        seq: u32,
        frag_index: u16,
        expected: u32,
        computed: u32,
    },

    /// Data length exceeds what the channel MTU allows.
    #[error("frame data of {len} bytes exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Trailing bytes after the declared data.
    #[error("frame declares {declared} data bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// `frag_count` is zero or `frag_index` is out of range.
    #[error("invalid fragment {frag_index} of {frag_count}")]
    InvalidFragment { frag_index: u16, frag_count: u16 },
}

/// CRC-32 (IEEE) of a data slice.
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Maximum data bytes per frame for a channel MTU.
#[inline]
pub fn max_data_len(mtu: usize) -> usize {
    mtu.saturating_sub(HEADER_SIZE).min(u16::MAX as usize)
}

/// A single radio frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number of the logical message.
    pub seq: u32,
    /// 0-based fragment index.
    pub frag_index: u16,
    /// Total fragments of the logical message.
    pub frag_count: u16,
    /// Raw message kind byte.
    pub kind: u8,
    /// CRC-32 over `data`, as carried on the wire.
    pub crc: u32,
    /// Fragment data (zero-copy slice of the message payload).
    pub data: Bytes,
}

impl Frame {
    /// Create a frame and compute its CRC.
    pub fn new(seq: u32, frag_index: u16, frag_count: u16, kind: MessageKind, data: Bytes) -> Self {
        Self {
            seq,
            frag_index,
            frag_count,
            kind: kind.as_u8(),
            crc: checksum(&data),
            data,
        }
    }

    /// Header describing this frame.
    pub fn header(&self) -> Header {
        Header::new(
            self.seq,
            self.frag_index,
            self.frag_count,
            self.kind,
            self.crc,
            self.data.len() as u16,
        )
    }

    /// Message kind, if the kind byte is known.
    #[inline]
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_u8(self.kind)
    }

    /// Whether the carried CRC matches the data.
    #[inline]
    pub fn crc_valid(&self) -> bool {
        checksum(&self.data) == self.crc
    }

    /// Whether this is the final fragment of its message.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.frag_index + 1 == self.frag_count
    }

    /// Size of this frame on the wire.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }
}

/// Encode a frame for a channel with the given MTU.
///
/// # Errors
///
/// `PayloadTooLarge` if the data does not fit in `mtu - HEADER_SIZE`.
pub fn encode_frame(frame: &Frame, mtu: usize) -> Result<Bytes, FrameError> {
    let max = max_data_len(mtu);
    if frame.data.len() > max {
        return Err(FrameError::PayloadTooLarge {
            len: frame.data.len(),
            max,
        });
    }

    let mut buf = BytesMut::with_capacity(frame.encoded_len());
    buf.put_slice(&frame.header().encode());
    buf.put_slice(&frame.data);
    Ok(buf.freeze())
}

/// Decode one radio transmission into a frame.
///
/// Checks, in order: header length, fragment fields, data length against the
/// MTU, total length against the declared data length, and finally the CRC.
pub fn decode_frame(buf: Bytes, mtu: usize) -> Result<Frame, FrameError> {
    let header = Header::decode(&buf).ok_or(FrameError::TooShort {
        needed: HEADER_SIZE,
        actual: buf.len(),
    })?;
    header.validate()?;

    let declared = header.data_len as usize;
    let max = max_data_len(mtu);
    if declared > max {
        return Err(FrameError::PayloadTooLarge { len: declared, max });
    }

    let needed = HEADER_SIZE + declared;
    if buf.len() < needed {
        return Err(FrameError::TooShort {
            needed,
            actual: buf.len(),
        });
    }
    if buf.len() > needed {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: buf.len() - HEADER_SIZE,
        });
    }

    let data = buf.slice(HEADER_SIZE..needed);
    let computed = checksum(&data);
    if computed != header.crc {
        return Err(FrameError::CrcMismatch {
            seq: header.seq,
            frag_index: header.frag_index,
            expected: header.crc,
            computed,
        });
    }

    Ok(Frame {
        seq: header.seq,
        frag_index: header.frag_index,
        frag_count: header.frag_count,
        kind: header.kind,
        crc: header.crc,
        data,
    })
}

/// Frame codec bound to one channel MTU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    mtu: usize,
}

impl FrameCodec {
    /// Create a codec for a channel MTU (header included).
    pub fn new(mtu: usize) -> Self {
        Self { mtu }
    }

    /// Channel MTU.
    #[inline]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Maximum data bytes per frame.
    #[inline]
    pub fn max_data_len(&self) -> usize {
        max_data_len(self.mtu)
    }

    /// Encode a frame.
    #[inline]
    pub fn encode(&self, frame: &Frame) -> Result<Bytes, FrameError> {
        encode_frame(frame, self.mtu)
    }

    /// Decode a frame.
    #[inline]
    pub fn decode(&self, buf: Bytes) -> Result<Frame, FrameError> {
        decode_frame(buf, self.mtu)
    }
}
