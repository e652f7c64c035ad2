//! Wire format encoding and decoding.
//!
//! Implements the 16-byte frame header:
//! ```text
//! ┌──────────┬────────────┬────────────┬──────┬──────────┬──────────┬──────────┐
//! │ Seq      │ Frag index │ Frag count │ Kind │ Reserved │ CRC-32   │ Data len │
//! │ 4 bytes  │ 2 bytes    │ 2 bytes    │ 1 B  │ 1 B      │ 4 bytes  │ 2 bytes  │
//! │ uint32 BE│ uint16 BE  │ uint16 BE  │      │ (0)      │ uint32 BE│ uint16 BE│
//! └──────────┴────────────┴────────────┴──────┴──────────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The CRC covers the data bytes only.

use std::fmt;

use super::FrameError;

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Default channel MTU: the SX127x FIFO limit for a single LoRa packet.
pub const DEFAULT_MTU: usize = 255;

/// Smallest MTU that can still carry one data byte per frame.
pub const MIN_MTU: usize = HEADER_SIZE + 1;

/// Largest fragment count representable by the 16-bit `frag_index` field.
pub const MAX_FRAGMENTS: usize = u16::MAX as usize;

/// Kind of logical message carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Position, heading, speed and battery snapshot.
    Telemetry = 1,
    /// Min/max/mean of the thermal frame.
    ThermalSummary = 2,
    /// Raw thermal image buffer (bulk).
    ThermalImage = 3,
}

impl MessageKind {
    /// Wire value of this kind.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire value. Returns `None` for unknown kinds.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Telemetry),
            2 => Some(Self::ThermalSummary),
            3 => Some(Self::ThermalImage),
            _ => None,
        }
    }

    /// Whether a newer message of this kind makes an older, unfinished one worthless.
    ///
    /// Only position/battery snapshots are superseded; thermal transfers must
    /// complete or time out on their own.
    #[inline]
    pub fn is_supersedable(self) -> bool {
        matches!(self, Self::Telemetry)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Telemetry => "telemetry",
            Self::ThermalSummary => "thermal-summary",
            Self::ThermalImage => "thermal-image",
        };
        f.write_str(name)
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Sequence number of the logical message.
    pub seq: u32,
    /// 0-based fragment index.
    pub frag_index: u16,
    /// Total fragments of the logical message (at least 1).
    pub frag_count: u16,
    /// Raw message kind byte.
    pub kind: u8,
    /// CRC-32 (IEEE) over the data bytes.
    pub crc: u32,
    /// Number of data bytes following the header.
    pub data_len: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(seq: u32, frag_index: u16, frag_count: u16, kind: u8, crc: u32, data_len: u16) -> Self {
        Self {
            seq,
            frag_index,
            frag_count,
            kind,
            crc,
            data_len,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use lora_telemetry::protocol::{Header, HEADER_SIZE};
    ///
    /// let header = Header::new(42, 0, 3, 1, 0xDEADBEEF, 16);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (16 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.seq.to_be_bytes());
        buf[4..6].copy_from_slice(&self.frag_index.to_be_bytes());
        buf[6..8].copy_from_slice(&self.frag_count.to_be_bytes());
        buf[8] = self.kind;
        buf[9] = 0;
        buf[10..14].copy_from_slice(&self.crc.to_be_bytes());
        buf[14..16].copy_from_slice(&self.data_len.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short. The reserved byte is ignored.
    ///
    /// # Example
    ///
    /// ```
    /// use lora_telemetry::protocol::Header;
    ///
    /// let bytes = [0, 0, 0, 7, 0, 1, 0, 2, 3, 0, 0, 0, 0, 0, 0, 5];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.seq, 7);
    /// assert_eq!(header.frag_index, 1);
    /// assert_eq!(header.frag_count, 2);
    /// assert_eq!(header.data_len, 5);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            seq: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            frag_index: u16::from_be_bytes([buf[4], buf[5]]),
            frag_count: u16::from_be_bytes([buf[6], buf[7]]),
            kind: buf[8],
            crc: u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]),
            data_len: u16::from_be_bytes([buf[14], buf[15]]),
        })
    }

    /// Validate the fragment fields.
    ///
    /// Checks:
    /// - `frag_count` is at least 1
    /// - `frag_index` is below `frag_count`
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.frag_count == 0 || self.frag_index >= self.frag_count {
            return Err(FrameError::InvalidFragment {
                frag_index: self.frag_index,
                frag_count: self.frag_count,
            });
        }
        Ok(())
    }

    /// Message kind, if the kind byte is known.
    #[inline]
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_u8(self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(0xCAFE_F00D, 2, 9, MessageKind::ThermalImage.as_u8(), 7, 239);
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(0x01020304, 0x0506, 0x0708, 0x09, 0x0A0B0C0D, 0x0E0F);
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[4..6], &[0x05, 0x06]);
        assert_eq!(&bytes[6..8], &[0x07, 0x08]);
        assert_eq!(bytes[8], 0x09);
        // Reserved
        assert_eq!(bytes[9], 0x00);
        assert_eq!(&bytes[10..14], &[0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(&bytes[14..16], &[0x0E, 0x0F]);
    }

    #[test]
    fn test_header_size_is_exactly_16() {
        assert_eq!(HEADER_SIZE, 16);
        assert_eq!(Header::new(1, 0, 1, 1, 0, 0).encode().len(), 16);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 15];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_decode_ignores_reserved_byte() {
        let mut bytes = Header::new(5, 0, 1, 1, 0, 0).encode();
        bytes[9] = 0xFF;
        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header.seq, 5);
        assert_eq!(header.encode()[9], 0);
    }

    #[test]
    fn test_validate_fragment_fields() {
        assert!(Header::new(1, 0, 1, 1, 0, 0).validate().is_ok());
        assert!(Header::new(1, 4, 5, 1, 0, 0).validate().is_ok());
        assert_eq!(
            Header::new(1, 0, 0, 1, 0, 0).validate(),
            Err(FrameError::InvalidFragment {
                frag_index: 0,
                frag_count: 0
            })
        );
        assert!(Header::new(1, 5, 5, 1, 0, 0).validate().is_err());
    }

    #[test]
    fn test_message_kind_wire_values() {
        for kind in [
            MessageKind::Telemetry,
            MessageKind::ThermalSummary,
            MessageKind::ThermalImage,
        ] {
            assert_eq!(MessageKind::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(MessageKind::from_u8(0), None);
        assert_eq!(MessageKind::from_u8(4), None);
    }

    #[test]
    fn test_message_kind_policy() {
        assert!(MessageKind::Telemetry.is_supersedable());
        assert!(!MessageKind::ThermalSummary.is_supersedable());
        assert!(!MessageKind::ThermalImage.is_supersedable());
    }
}
