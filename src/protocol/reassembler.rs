//! Reassembly of logical messages from received frames.
//!
//! Each sequence number moves through a small state machine:
//! - `Empty`: never seen
//! - `Collecting`: buffer open, some fragments received
//! - `Complete` / `Expired` / `Superseded`: buffer destroyed, seq closed
//!
//! Closed sequence numbers are remembered in a bounded history so a late
//! duplicate can never reopen them. Once a seq falls out of that history,
//! every seq at or behind the newest forgotten one is treated as stale.
//! Frames may arrive in any order.
//!
//! # Example
//!
//! ```
//! use lora_telemetry::protocol::{Fragmenter, LogicalMessage, MessageKind, Outcome, Reassembler};
//! use tokio::time::Instant;
//!
//! let message = LogicalMessage::new(1, MessageKind::ThermalImage, vec![7u8; 40]);
//! let mut frames: Vec<_> = Fragmenter::new(16).fragment(&message).unwrap().collect();
//! frames.reverse();
//!
//! let mut reassembler = Reassembler::default();
//! let mut completed = None;
//! for frame in frames {
//!     if let Outcome::Complete(msg) = reassembler.accept(frame, Instant::now()).unwrap() {
//!         completed = Some(msg);
//!     }
//! }
//! assert_eq!(completed.unwrap(), message);
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use super::frame::Frame;
use super::message::LogicalMessage;
use super::sequence::{seq_distance, seq_newer};
use super::wire_format::MessageKind;
use crate::error::{LinkError, Result};

/// Default time a buffer may stay incomplete before it expires.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum number of concurrent reassembly buffers.
pub const DEFAULT_MAX_BUFFERS: usize = 32;

/// Default number of closed sequence numbers remembered.
pub const DEFAULT_CLOSED_HISTORY: usize = 1024;

/// Default distance behind the newest seq beyond which frames are stale.
pub const DEFAULT_STALE_WINDOW: u32 = 4096;

/// Reassembler configuration.
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// Time since the first fragment after which an incomplete buffer expires.
    pub timeout: Duration,
    /// Maximum concurrent buffers before new seqs are refused.
    pub max_buffers: usize,
    /// Closed seqs remembered to prevent reopening.
    pub closed_history: usize,
    /// Frames further than this behind the newest seq are dropped as stale.
    pub stale_window: u32,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REASSEMBLY_TIMEOUT,
            max_buffers: DEFAULT_MAX_BUFFERS,
            closed_history: DEFAULT_CLOSED_HISTORY,
            stale_window: DEFAULT_STALE_WINDOW,
        }
    }
}

/// Why a sequence number was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// All fragments arrived and the message was emitted.
    Complete,
    /// The reassembly timeout elapsed first.
    Expired,
    /// A newer telemetry snapshot made it worthless.
    Superseded,
}

/// Observable state of one sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqState {
    /// Never seen, or forgotten from the closed history.
    Empty,
    /// Buffer open.
    Collecting { received: u16, frag_count: u16 },
    /// Buffer destroyed; the seq is never reopened.
    Closed(CloseReason),
}

/// Result of accepting one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stored; the message is still incomplete.
    Pending { seq: u32, received: u16, frag_count: u16 },
    /// The frame completed its message.
    Complete(LogicalMessage),
    /// The fragment was already held; the newer copy replaced it.
    Duplicate { seq: u32, frag_index: u16 },
    /// The seq is closed, superseded, or too far behind.
    Stale { seq: u32 },
    /// The frame's data fails its CRC.
    Corrupt { seq: u32, frag_index: u16 },
    /// Kind or fragment fields disagree with the buffer or are invalid.
    Inconsistent { seq: u32, frag_index: u16 },
}

/// A buffer destroyed by the timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredBuffer {
    pub seq: u32,
    pub kind: MessageKind,
    pub received: u16,
    pub frag_count: u16,
    pub age: Duration,
}

impl From<ExpiredBuffer> for LinkError {
    fn from(expired: ExpiredBuffer) -> Self {
        LinkError::ReassemblyExpired {
            seq: expired.seq,
            kind: expired.kind,
            received: expired.received,
            frag_count: expired.frag_count,
        }
    }
}

/// Reassembler statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Frames offered to the reassembler.
    pub frames_received: u64,
    /// Messages reassembled and emitted.
    pub messages_completed: u64,
    /// Buffers destroyed by the timeout.
    pub buffers_expired: u64,
    /// Telemetry buffers discarded for a newer snapshot.
    pub buffers_superseded: u64,
    /// Duplicate fragments.
    pub duplicates: u64,
    /// Frames failing their CRC.
    pub corrupt_frames: u64,
    /// Frames for closed, superseded or out-of-window seqs.
    pub stale_frames: u64,
    /// Frames disagreeing with their buffer.
    pub inconsistent_frames: u64,
    /// New seqs refused at capacity.
    pub capacity_refusals: u64,
    /// Buffers currently open.
    pub pending_buffers: usize,
}

/// Per-seq buffer collecting fragments.
#[derive(Debug)]
struct ReassemblyBuffer {
    kind: MessageKind,
    frag_count: u16,
    received: u16,
    slots: Vec<Option<Bytes>>,
    first_seen_at: Instant,
    last_update_at: Instant,
}

impl ReassemblyBuffer {
    fn new(kind: MessageKind, frag_count: u16, now: Instant) -> Self {
        Self {
            kind,
            frag_count,
            received: 0,
            slots: vec![None; frag_count as usize],
            first_seen_at: now,
            last_update_at: now,
        }
    }

    /// Store a fragment. Returns `false` if the slot was already filled.
    fn insert(&mut self, frag_index: u16, data: Bytes, now: Instant) -> bool {
        self.last_update_at = now;
        let slot = &mut self.slots[frag_index as usize];
        let fresh = slot.is_none();
        *slot = Some(data);
        if fresh {
            self.received += 1;
        }
        fresh
    }

    fn is_complete(&self) -> bool {
        self.received == self.frag_count
    }

    fn assemble(self) -> Bytes {
        let len = self.slots.iter().flatten().map(Bytes::len).sum();
        let mut payload = BytesMut::with_capacity(len);
        for data in self.slots.into_iter().flatten() {
            payload.extend_from_slice(&data);
        }
        payload.freeze()
    }
}

/// Reassembles logical messages from frames delivered in any order.
pub struct Reassembler {
    config: ReassemblyConfig,
    buffers: HashMap<u32, ReassemblyBuffer>,
    closed: HashMap<u32, CloseReason>,
    closed_order: VecDeque<u32>,
    newest_seq: Option<u32>,
    newest_telemetry: Option<u32>,
    /// Newest seq evicted from the closed history.
    forgotten_up_to: Option<u32>,
    expired_backlog: Vec<ExpiredBuffer>,
    stats: ReassemblyStats,
}

impl Reassembler {
    /// Create a new reassembler.
    pub fn new(config: ReassemblyConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
            closed: HashMap::new(),
            closed_order: VecDeque::new(),
            newest_seq: None,
            newest_telemetry: None,
            forgotten_up_to: None,
            expired_backlog: Vec::new(),
            stats: ReassemblyStats::default(),
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> ReassemblyStats {
        let mut stats = self.stats.clone();
        stats.pending_buffers = self.buffers.len();
        stats
    }

    /// Number of open buffers.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Observable state of a sequence number.
    pub fn state(&self, seq: u32) -> SeqState {
        if let Some(buffer) = self.buffers.get(&seq) {
            return SeqState::Collecting {
                received: buffer.received,
                frag_count: buffer.frag_count,
            };
        }
        match self.closed.get(&seq) {
            Some(reason) => SeqState::Closed(*reason),
            None => SeqState::Empty,
        }
    }

    /// Accept one decoded frame.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` when the frame would open a new buffer while
    /// `max_buffers` are already open (after expiring timed-out ones). The
    /// frame is not stored; the caller should stop accepting new seqs until
    /// buffers complete or expire.
    pub fn accept(&mut self, frame: Frame, now: Instant) -> Result<Outcome> {
        self.stats.frames_received += 1;
        let seq = frame.seq;
        let frag_index = frame.frag_index;

        if !frame.crc_valid() {
            self.stats.corrupt_frames += 1;
            return Ok(Outcome::Corrupt { seq, frag_index });
        }

        let kind = match frame.message_kind() {
            Some(kind) if frame.frag_count > 0 && frag_index < frame.frag_count => kind,
            _ => {
                self.stats.inconsistent_frames += 1;
                return Ok(Outcome::Inconsistent { seq, frag_index });
            }
        };

        if self.closed.contains_key(&seq)
            || self.is_outside_window(seq)
            || self.is_forgotten(seq)
        {
            self.stats.stale_frames += 1;
            return Ok(Outcome::Stale { seq });
        }

        if let Some(buffer) = self.buffers.get(&seq) {
            if buffer.kind != kind || buffer.frag_count != frame.frag_count {
                tracing::debug!(
                    seq,
                    frag_index,
                    "fragment disagrees with its reassembly buffer"
                );
                self.stats.inconsistent_frames += 1;
                return Ok(Outcome::Inconsistent { seq, frag_index });
            }
        }

        if kind.is_supersedable() {
            if let Some(newest) = self.newest_telemetry {
                if seq_newer(newest, seq) {
                    self.stats.stale_frames += 1;
                    return Ok(Outcome::Stale { seq });
                }
            }
            self.newest_telemetry = Some(seq);
            self.supersede_older(kind, seq);
        }

        if !self.buffers.contains_key(&seq) {
            if self.buffers.len() >= self.config.max_buffers {
                let expired = self.collect_expired(now);
                self.expired_backlog.extend(expired);
            }
            if self.buffers.len() >= self.config.max_buffers {
                self.stats.capacity_refusals += 1;
                return Err(LinkError::CapacityExhausted {
                    limit: self.config.max_buffers,
                });
            }
            self.buffers
                .insert(seq, ReassemblyBuffer::new(kind, frame.frag_count, now));
        }

        match self.newest_seq {
            Some(newest) if !seq_newer(seq, newest) => {}
            _ => self.newest_seq = Some(seq),
        }

        let Some(buffer) = self.buffers.get_mut(&seq) else {
            return Ok(Outcome::Stale { seq });
        };

        if !buffer.insert(frag_index, frame.data, now) {
            self.stats.duplicates += 1;
            return Ok(Outcome::Duplicate { seq, frag_index });
        }

        if !buffer.is_complete() {
            return Ok(Outcome::Pending {
                seq,
                received: buffer.received,
                frag_count: buffer.frag_count,
            });
        }

        let Some(buffer) = self.buffers.remove(&seq) else {
            return Ok(Outcome::Stale { seq });
        };
        let kind = buffer.kind;
        let payload = buffer.assemble();
        self.close(seq, CloseReason::Complete);
        self.stats.messages_completed += 1;

        Ok(Outcome::Complete(LogicalMessage::new(seq, kind, payload)))
    }

    /// Destroy buffers older than the timeout.
    ///
    /// Also returns buffers expired earlier while making room for a new seq.
    pub fn expire(&mut self, now: Instant) -> Vec<ExpiredBuffer> {
        let mut expired = std::mem::take(&mut self.expired_backlog);
        expired.extend(self.collect_expired(now));
        expired
    }

    /// Abandon every open buffer without closing their seqs.
    pub fn clear(&mut self) -> usize {
        let abandoned = self.buffers.len();
        self.buffers.clear();
        abandoned
    }

    fn collect_expired(&mut self, now: Instant) -> Vec<ExpiredBuffer> {
        let timeout = self.config.timeout;
        let timed_out: Vec<u32> = self
            .buffers
            .iter()
            .filter(|(_, b)| now.saturating_duration_since(b.first_seen_at) > timeout)
            .map(|(seq, _)| *seq)
            .collect();

        let mut expired = Vec::with_capacity(timed_out.len());
        for seq in timed_out {
            if let Some(buffer) = self.buffers.remove(&seq) {
                self.close(seq, CloseReason::Expired);
                self.stats.buffers_expired += 1;
                expired.push(ExpiredBuffer {
                    seq,
                    kind: buffer.kind,
                    received: buffer.received,
                    frag_count: buffer.frag_count,
                    age: now.saturating_duration_since(buffer.first_seen_at),
                });
            }
        }
        expired
    }

    fn supersede_older(&mut self, kind: MessageKind, seq: u32) {
        let older: Vec<u32> = self
            .buffers
            .iter()
            .filter(|(s, b)| b.kind == kind && seq_newer(seq, **s))
            .map(|(s, _)| *s)
            .collect();

        for old in older {
            if let Some(buffer) = self.buffers.remove(&old) {
                tracing::debug!(
                    seq = old,
                    newer = seq,
                    received = buffer.received,
                    frag_count = buffer.frag_count,
                    "discarding superseded telemetry"
                );
                self.close(old, CloseReason::Superseded);
                self.stats.buffers_superseded += 1;
            }
        }
    }

    fn is_outside_window(&self, seq: u32) -> bool {
        match self.newest_seq {
            Some(newest) => {
                seq_newer(newest, seq) && seq_distance(seq, newest) > self.config.stale_window
            }
            None => false,
        }
    }

    /// A seq with no open buffer at or behind the eviction watermark.
    fn is_forgotten(&self, seq: u32) -> bool {
        match self.forgotten_up_to {
            Some(watermark) => !seq_newer(seq, watermark) && !self.buffers.contains_key(&seq),
            None => false,
        }
    }

    fn close(&mut self, seq: u32, reason: CloseReason) {
        if self.closed.insert(seq, reason).is_none() {
            self.closed_order.push_back(seq);
        }
        while self.closed_order.len() > self.config.closed_history {
            if let Some(oldest) = self.closed_order.pop_front() {
                self.closed.remove(&oldest);
                match self.forgotten_up_to {
                    Some(watermark) if !seq_newer(oldest, watermark) => {}
                    _ => self.forgotten_up_to = Some(oldest),
                }
            }
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(ReassemblyConfig::default())
    }
}
