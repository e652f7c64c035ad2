//! Fragmentation of logical messages into MTU-sized frames.
//!
//! The fragmenter never copies payload bytes: every frame's data is a
//! `Bytes` slice of the message payload. Fragments are produced lazily and
//! the iterator is `Clone`, so a sequence can be restarted from the start.
//!
//! # Example
//!
//! ```
//! use lora_telemetry::protocol::{Fragmenter, LogicalMessage, MessageKind};
//!
//! let fragmenter = Fragmenter::new(16);
//! let message = LogicalMessage::new(3, MessageKind::ThermalImage, vec![0u8; 40]);
//! let frames: Vec<_> = fragmenter.fragment(&message).unwrap().collect();
//!
//! assert_eq!(frames.len(), 3);
//! assert_eq!(frames[2].data.len(), 8);
//! ```

use bytes::Bytes;

use super::frame::{max_data_len, Frame};
use super::message::LogicalMessage;
use super::wire_format::{MessageKind, MAX_FRAGMENTS};
use crate::error::{LinkError, Result};

/// Splits logical messages into frames of at most `max_data` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragmenter {
    max_data: usize,
}

impl Fragmenter {
    /// Create a fragmenter with a maximum data size per frame.
    ///
    /// A size of zero is raised to one byte.
    pub fn new(max_data: usize) -> Self {
        Self {
            max_data: max_data.max(1),
        }
    }

    /// Create a fragmenter for a channel MTU (header included).
    pub fn for_mtu(mtu: usize) -> Self {
        Self::new(max_data_len(mtu))
    }

    /// Maximum data bytes per frame.
    #[inline]
    pub fn max_data(&self) -> usize {
        self.max_data
    }

    /// Number of frames a payload of `len` bytes needs (at least one).
    #[inline]
    pub fn fragment_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_data).max(1)
    }

    /// Whether a payload of `len` bytes needs more than one frame.
    #[inline]
    pub fn needs_fragmentation(&self, len: usize) -> bool {
        len > self.max_data
    }

    /// Fragment a message.
    ///
    /// # Errors
    ///
    /// `MessageTooLarge` if the payload needs more fragments than the 16-bit
    /// fragment index can address. The message cannot be sent on this channel.
    pub fn fragment(&self, message: &LogicalMessage) -> Result<Fragments> {
        let count = self.fragment_count(message.payload.len());
        if count > MAX_FRAGMENTS {
            return Err(LinkError::MessageTooLarge {
                seq: message.seq,
                len: message.payload.len(),
                fragments: count,
                max_fragments: MAX_FRAGMENTS,
            });
        }

        Ok(Fragments {
            seq: message.seq,
            kind: message.kind,
            payload: message.payload.clone(),
            max_data: self.max_data,
            frag_count: count as u16,
            next: 0,
        })
    }
}

/// Lazy, finite, restartable sequence of frames for one message.
#[derive(Debug, Clone)]
pub struct Fragments {
    seq: u32,
    kind: MessageKind,
    payload: Bytes,
    max_data: usize,
    frag_count: u16,
    next: u16,
}

impl Fragments {
    /// Sequence number of the message.
    #[inline]
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Kind of the message.
    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Total fragments of the message.
    #[inline]
    pub fn frag_count(&self) -> u16 {
        self.frag_count
    }

    /// Rewind to the first fragment.
    pub fn restart(&mut self) {
        self.next = 0;
    }
}

impl Iterator for Fragments {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.next >= self.frag_count {
            return None;
        }

        let start = self.next as usize * self.max_data;
        let end = (start + self.max_data).min(self.payload.len());
        let data = self.payload.slice(start.min(end)..end);
        let frame = Frame::new(self.seq, self.next, self.frag_count, self.kind, data);

        self.next += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.frag_count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Fragments {}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(len: usize) -> LogicalMessage {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        LogicalMessage::new(10, MessageKind::ThermalImage, payload)
    }

    #[test]
    fn test_single_frame_message() {
        let fragmenter = Fragmenter::new(16);
        let frames: Vec<_> = fragmenter.fragment(&message(10)).unwrap().collect();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frag_index, 0);
        assert_eq!(frames[0].frag_count, 1);
        assert_eq!(frames[0].data.len(), 10);
        assert!(frames[0].crc_valid());
    }

    #[test]
    fn test_empty_payload_yields_one_empty_frame() {
        let fragmenter = Fragmenter::new(16);
        let frames: Vec<_> = fragmenter.fragment(&message(0)).unwrap().collect();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frag_count, 1);
        assert!(frames[0].data.is_empty());
    }

    #[test]
    fn test_forty_bytes_at_mtu_32() {
        let fragmenter = Fragmenter::for_mtu(32);
        assert_eq!(fragmenter.max_data(), 16);

        let msg = message(40);
        let frames: Vec<_> = fragmenter.fragment(&msg).unwrap().collect();

        let sizes: Vec<_> = frames.iter().map(|f| f.data.len()).collect();
        assert_eq!(sizes, vec![16, 16, 8]);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.frag_index as usize, i);
            assert_eq!(frame.frag_count, 3);
            assert_eq!(frame.seq, 10);
        }

        let joined: Vec<u8> = frames.iter().flat_map(|f| f.data.iter().copied()).collect();
        assert_eq!(&joined[..], &msg.payload[..]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let fragmenter = Fragmenter::new(16);
        let frames: Vec<_> = fragmenter.fragment(&message(32)).unwrap().collect();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.data.len() == 16));
    }

    #[test]
    fn test_fragments_are_zero_copy_slices() {
        let fragmenter = Fragmenter::new(4);
        let msg = message(12);
        let frames: Vec<_> = fragmenter.fragment(&msg).unwrap().collect();
        assert_eq!(frames[1].data.as_ptr(), msg.payload[4..].as_ptr());
    }

    #[test]
    fn test_restartable_and_exact_size() {
        let fragmenter = Fragmenter::new(16);
        let mut fragments = fragmenter.fragment(&message(40)).unwrap();
        assert_eq!(fragments.len(), 3);

        let first = fragments.next().unwrap();
        assert_eq!(fragments.len(), 2);

        let snapshot = fragments.clone();
        assert_eq!(snapshot.count(), 2);

        fragments.restart();
        assert_eq!(fragments.next().unwrap(), first);
        assert_eq!(fragments.count(), 2);
    }

    #[test]
    fn test_message_too_large() {
        let fragmenter = Fragmenter::new(1);
        let msg = LogicalMessage::new(5, MessageKind::ThermalImage, vec![0u8; MAX_FRAGMENTS + 1]);

        match fragmenter.fragment(&msg) {
            Err(LinkError::MessageTooLarge {
                seq,
                fragments,
                max_fragments,
                ..
            }) => {
                assert_eq!(seq, 5);
                assert_eq!(fragments, MAX_FRAGMENTS + 1);
                assert_eq!(max_fragments, MAX_FRAGMENTS);
            }
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_largest_representable_message() {
        let fragmenter = Fragmenter::new(1);
        let msg = LogicalMessage::new(5, MessageKind::ThermalImage, vec![0u8; MAX_FRAGMENTS]);
        let fragments = fragmenter.fragment(&msg).unwrap();
        assert_eq!(fragments.frag_count(), u16::MAX);
        assert_eq!(fragments.last().unwrap().frag_index, u16::MAX - 1);
    }

    #[test]
    fn test_zero_max_data_is_clamped() {
        let fragmenter = Fragmenter::for_mtu(8);
        assert_eq!(fragmenter.max_data(), 1);
        assert!(fragmenter.needs_fragmentation(2));
    }
}
