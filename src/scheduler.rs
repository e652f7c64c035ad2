//! Link scheduler: decides which queued frame goes on air next.
//!
//! The scheduler is synchronous and owns no I/O; the link task drives it.
//!
//! # Queues
//!
//! - **High**: Telemetry and ThermalSummary frames. Bounded; on overflow the
//!   oldest frame is dropped.
//! - **Bulk**: ThermalImage fragments. Bounded; new frames are rejected with
//!   `QueueFull` when it is full. [`LinkScheduler::enqueue_batch`] admits all
//!   fragments of a message or none, so a partial image never goes on air.
//!
//! # Fairness
//!
//! Strict priority for the high queue, with two bounds so bulk never starves:
//! after `max_high_burst` consecutive high sends while bulk is waiting, one bulk
//! frame goes next; and a bulk frame waiting longer than `bulk_max_wait` goes
//! next.
//!
//! # Pacing and retries
//!
//! No frame is released before `min_interval` has elapsed since the previous
//! attempt. A failed frame goes back to the front of its queue, at most
//! `max_retries` times, so frame order within a seq is preserved.
//!
//! # Usage
//!
//! ```
//! use lora_telemetry::protocol::{Frame, MessageKind};
//! use lora_telemetry::scheduler::{LinkScheduler, SchedulerConfig};
//! use bytes::Bytes;
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let mut scheduler = LinkScheduler::new(SchedulerConfig::default(), Duration::from_millis(100));
//! let now = Instant::now();
//! let frame = Frame::new(1, 0, 1, MessageKind::Telemetry, Bytes::from_static(b"fix"));
//! scheduler.enqueue(frame, now).unwrap();
//!
//! let queued = scheduler.poll(now).unwrap();
//! // radio.send(...) succeeded:
//! scheduler.on_sent(queued, now);
//! assert!(scheduler.is_empty());
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{LinkError, Result};
use crate::protocol::{seq_newer, Frame, MessageKind};

/// Default retries per frame after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default high queue capacity in frames.
pub const DEFAULT_HIGH_CAPACITY: usize = 64;

/// Default bulk queue capacity in frames.
pub const DEFAULT_BULK_CAPACITY: usize = 1024;

/// Default consecutive high sends before bulk gets a turn.
pub const DEFAULT_MAX_HIGH_BURST: u32 = 4;

/// Default longest wait for a bulk frame before it goes next.
pub const DEFAULT_BULK_MAX_WAIT: Duration = Duration::from_secs(10);

/// Scheduling class of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Telemetry and ThermalSummary.
    High,
    /// ThermalImage fragments.
    Bulk,
}

impl Priority {
    /// Scheduling class for a message kind.
    pub fn of(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Telemetry | MessageKind::ThermalSummary => Priority::High,
            MessageKind::ThermalImage => Priority::Bulk,
        }
    }

    /// Scheduling class for a frame; unknown kinds go to bulk.
    pub fn of_frame(frame: &Frame) -> Self {
        frame.message_kind().map_or(Priority::Bulk, Priority::of)
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Requeues allowed per frame after a failed send.
    pub max_retries: u32,
    /// High queue capacity (frames).
    pub high_capacity: usize,
    /// Bulk queue capacity (frames).
    pub bulk_capacity: usize,
    /// Consecutive high sends allowed while bulk is waiting.
    pub max_high_burst: u32,
    /// Longest a bulk frame waits before it goes next.
    pub bulk_max_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            high_capacity: DEFAULT_HIGH_CAPACITY,
            bulk_capacity: DEFAULT_BULK_CAPACITY,
            max_high_burst: DEFAULT_MAX_HIGH_BURST,
            bulk_max_wait: DEFAULT_BULK_MAX_WAIT,
        }
    }
}

impl SchedulerConfig {
    /// Telemetry only: images get a minimal share of airtime.
    pub fn telemetry_first() -> Self {
        Self {
            max_high_burst: 16,
            bulk_max_wait: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Image-heavy missions: bulk gets every other slot.
    pub fn image_heavy() -> Self {
        Self {
            max_high_burst: 1,
            bulk_max_wait: Duration::from_secs(2),
            bulk_capacity: 4096,
            ..Default::default()
        }
    }
}

/// A frame waiting for (re)transmission.
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    /// The frame to transmit.
    pub frame: Frame,
    /// Queue the frame belongs to.
    pub priority: Priority,
    /// Transmission attempts so far.
    pub attempts: u32,
    enqueued_at: Instant,
}

/// Scheduler statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Frames accepted into a queue.
    pub frames_enqueued: u64,
    /// Frames sent successfully.
    pub frames_sent: u64,
    /// Failed sends that were requeued.
    pub frames_retried: u64,
    /// Frames dropped after exhausting retries.
    pub frames_failed: u64,
    /// Telemetry frames purged for a newer snapshot.
    pub frames_superseded: u64,
    /// High frames dropped on overflow.
    pub frames_overflowed: u64,
    /// Bulk frames rejected on a full queue.
    pub frames_rejected: u64,
    /// Bulk frames abandoned at shutdown.
    pub frames_abandoned: u64,
}

/// Priority scheduler with pacing and bounded retries.
pub struct LinkScheduler {
    config: SchedulerConfig,
    min_interval: Duration,
    high: VecDeque<QueuedFrame>,
    bulk: VecDeque<QueuedFrame>,
    high_streak: u32,
    last_attempt: Option<Instant>,
    last_bulk_service: Option<Instant>,
    newest_telemetry: Option<u32>,
    stats: SchedulerStats,
}

impl LinkScheduler {
    /// Create a scheduler for a radio with the given minimum interval.
    pub fn new(config: SchedulerConfig, min_interval: Duration) -> Self {
        Self {
            high: VecDeque::with_capacity(config.high_capacity),
            bulk: VecDeque::new(),
            config,
            min_interval,
            high_streak: 0,
            last_attempt: None,
            last_bulk_service: None,
            newest_telemetry: None,
            stats: SchedulerStats::default(),
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Whether both queues are empty.
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.bulk.is_empty()
    }

    /// Total queued frames.
    pub fn len(&self) -> usize {
        self.high.len() + self.bulk.len()
    }

    /// Queued frames per queue: `(high, bulk)`.
    pub fn queue_depths(&self) -> (usize, usize) {
        (self.high.len(), self.bulk.len())
    }

    /// Queue a frame.
    ///
    /// A Telemetry frame newer than every queued Telemetry seq purges the
    /// older ones; a Telemetry frame older than the newest is dropped.
    ///
    /// # Errors
    ///
    /// `QueueFull` if the frame belongs to the bulk queue and it is full.
    pub fn enqueue(&mut self, frame: Frame, now: Instant) -> Result<()> {
        let kind = frame.message_kind();
        let priority = Priority::of_frame(&frame);

        if kind.is_some_and(MessageKind::is_supersedable) {
            match self.newest_telemetry {
                Some(newest) if seq_newer(newest, frame.seq) => {
                    self.stats.frames_superseded += 1;
                    return Ok(());
                }
                Some(newest) if newest != frame.seq => self.purge_telemetry_before(frame.seq),
                _ => {}
            }
            self.newest_telemetry = Some(frame.seq);
        }

        let queued = QueuedFrame {
            frame,
            priority,
            attempts: 0,
            enqueued_at: now,
        };

        match priority {
            Priority::High => {
                if self.high.len() >= self.config.high_capacity {
                    if let Some(dropped) = self.high.pop_front() {
                        tracing::warn!(
                            seq = dropped.frame.seq,
                            frag_index = dropped.frame.frag_index,
                            "high queue full, dropping oldest frame"
                        );
                        self.stats.frames_overflowed += 1;
                    }
                }
                self.high.push_back(queued);
            }
            Priority::Bulk => {
                if self.bulk.len() >= self.config.bulk_capacity {
                    self.stats.frames_rejected += 1;
                    return Err(LinkError::QueueFull);
                }
                self.bulk.push_back(queued);
            }
        }

        self.stats.frames_enqueued += 1;
        Ok(())
    }

    /// Queue every frame of one message, or none of them.
    ///
    /// # Errors
    ///
    /// `QueueFull` if the bulk queue lacks room for all of the batch's bulk
    /// frames. Nothing is queued and every bulk frame counts as rejected.
    pub fn enqueue_batch(&mut self, frames: Vec<Frame>, now: Instant) -> Result<()> {
        let bulk = frames
            .iter()
            .filter(|f| Priority::of_frame(f) == Priority::Bulk)
            .count();

        if bulk > 0 && self.bulk.len() + bulk > self.config.bulk_capacity {
            self.stats.frames_rejected += bulk as u64;
            tracing::warn!(
                seq = frames.first().map(|f| f.seq),
                frames = bulk,
                queued = self.bulk.len(),
                "bulk queue full, rejecting whole message"
            );
            return Err(LinkError::QueueFull);
        }

        for frame in frames {
            self.enqueue(frame, now)?;
        }
        Ok(())
    }

    /// Earliest time the next transmission may start.
    pub fn next_slot(&self) -> Option<Instant> {
        self.last_attempt.map(|t| t + self.min_interval)
    }

    /// Take the next frame to transmit, if one is due.
    ///
    /// Returns `None` when both queues are empty or the pacing interval has
    /// not elapsed. The caller must report the result with
    /// [`on_sent`](Self::on_sent) or [`on_failed`](Self::on_failed).
    pub fn poll(&mut self, now: Instant) -> Option<QueuedFrame> {
        if self.next_slot().is_some_and(|slot| now < slot) {
            return None;
        }

        let mut queued = if self.bulk_is_due(now) {
            self.high_streak = 0;
            self.last_bulk_service = Some(now);
            self.bulk.pop_front()?
        } else {
            let queued = self.high.pop_front()?;
            if self.bulk.is_empty() {
                self.high_streak = 0;
            } else {
                self.high_streak += 1;
            }
            queued
        };

        queued.attempts += 1;
        self.last_attempt = Some(now);
        Some(queued)
    }

    /// Record a successful transmission.
    pub fn on_sent(&mut self, queued: QueuedFrame, now: Instant) {
        self.last_attempt = Some(now);
        self.stats.frames_sent += 1;
        tracing::debug!(
            seq = queued.frame.seq,
            frag_index = queued.frame.frag_index,
            attempts = queued.attempts,
            "frame sent"
        );
    }

    /// Record a failed transmission.
    ///
    /// Requeues the frame at the front of its queue, or drops it once it has
    /// been retried `max_retries` times and returns `LinkSendFailed`.
    pub fn on_failed(&mut self, queued: QueuedFrame, now: Instant) -> Option<LinkError> {
        self.last_attempt = Some(now);
        let seq = queued.frame.seq;
        let frag_index = queued.frame.frag_index;

        let superseded = queued
            .frame
            .message_kind()
            .is_some_and(MessageKind::is_supersedable)
            && self
                .newest_telemetry
                .is_some_and(|newest| seq_newer(newest, seq));
        if superseded {
            self.stats.frames_superseded += 1;
            return None;
        }

        if queued.attempts > self.config.max_retries {
            self.stats.frames_failed += 1;
            tracing::warn!(seq, frag_index, attempts = queued.attempts, "frame dropped");
            return Some(LinkError::LinkSendFailed {
                seq,
                frag_index,
                attempts: queued.attempts,
            });
        }

        self.stats.frames_retried += 1;
        tracing::debug!(seq, frag_index, attempts = queued.attempts, "requeueing frame");
        match queued.priority {
            Priority::High => self.high.push_front(queued),
            Priority::Bulk => self.bulk.push_front(queued),
        }
        None
    }

    /// Discard every queued bulk frame.
    pub fn abandon_bulk(&mut self) -> usize {
        let abandoned = self.bulk.len();
        self.bulk.clear();
        self.stats.frames_abandoned += abandoned as u64;
        abandoned
    }

    fn bulk_is_due(&self, now: Instant) -> bool {
        let Some(front) = self.bulk.front() else {
            return false;
        };
        if self.high.is_empty() || self.high_streak >= self.config.max_high_burst {
            return true;
        }

        let since = match self.last_bulk_service {
            Some(t) if t > front.enqueued_at => t,
            _ => front.enqueued_at,
        };
        now.saturating_duration_since(since) >= self.config.bulk_max_wait
    }

    fn purge_telemetry_before(&mut self, seq: u32) {
        let before = self.high.len();
        self.high.retain(|q| {
            !(q.frame
                .message_kind()
                .is_some_and(MessageKind::is_supersedable)
                && seq_newer(seq, q.frame.seq))
        });
        let purged = before - self.high.len();
        if purged > 0 {
            tracing::debug!(seq, purged, "purged superseded telemetry frames");
            self.stats.frames_superseded += purged as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(seq: u32, frag_index: u16, frag_count: u16, kind: MessageKind) -> Frame {
        Frame::new(seq, frag_index, frag_count, kind, Bytes::from(vec![frag_index as u8; 4]))
    }

    fn ids(scheduler: &mut LinkScheduler, now: Instant) -> Vec<(u32, u16)> {
        let mut out = Vec::new();
        while let Some(q) = scheduler.poll(now) {
            out.push((q.frame.seq, q.frame.frag_index));
            scheduler.on_sent(q, now);
        }
        out
    }

    #[test]
    fn test_high_before_bulk() {
        let mut scheduler = LinkScheduler::new(SchedulerConfig::default(), Duration::ZERO);
        let now = Instant::now();

        scheduler.enqueue(frame(1, 0, 1, MessageKind::ThermalImage), now).unwrap();
        scheduler.enqueue(frame(2, 0, 1, MessageKind::ThermalSummary), now).unwrap();

        assert_eq!(ids(&mut scheduler, now), vec![(2, 0), (1, 0)]);
    }

    #[test]
    fn test_burst_bound_lets_bulk_through() {
        let config = SchedulerConfig {
            max_high_burst: 2,
            ..Default::default()
        };
        let mut scheduler = LinkScheduler::new(config, Duration::ZERO);
        let now = Instant::now();

        scheduler.enqueue(frame(1, 0, 2, MessageKind::ThermalImage), now).unwrap();
        scheduler.enqueue(frame(1, 1, 2, MessageKind::ThermalImage), now).unwrap();
        for seq in 2..=6 {
            scheduler.enqueue(frame(seq, 0, 1, MessageKind::ThermalSummary), now).unwrap();
        }

        assert_eq!(
            ids(&mut scheduler, now),
            vec![(2, 0), (3, 0), (1, 0), (4, 0), (5, 0), (1, 1), (6, 0)]
        );
    }

    #[test]
    fn test_aging_bound_lets_bulk_through() {
        let config = SchedulerConfig {
            max_high_burst: 100,
            bulk_max_wait: Duration::from_secs(5),
            ..Default::default()
        };
        let mut scheduler = LinkScheduler::new(config, Duration::ZERO);
        let start = Instant::now();

        scheduler.enqueue(frame(1, 0, 1, MessageKind::ThermalImage), start).unwrap();
        scheduler.enqueue(frame(2, 0, 1, MessageKind::ThermalSummary), start).unwrap();
        scheduler.enqueue(frame(3, 0, 1, MessageKind::ThermalSummary), start).unwrap();

        let q = scheduler.poll(start + Duration::from_secs(1)).unwrap();
        assert_eq!(q.frame.seq, 2);
        scheduler.on_sent(q, start + Duration::from_secs(1));

        let q = scheduler.poll(start + Duration::from_secs(5)).unwrap();
        assert_eq!(q.frame.seq, 1);
    }

    #[test]
    fn test_pacing_respects_min_interval() {
        let mut scheduler = LinkScheduler::new(SchedulerConfig::default(), Duration::from_millis(500));
        let start = Instant::now();

        scheduler.enqueue(frame(1, 0, 1, MessageKind::ThermalSummary), start).unwrap();
        scheduler.enqueue(frame(2, 0, 1, MessageKind::ThermalSummary), start).unwrap();

        let q = scheduler.poll(start).unwrap();
        scheduler.on_sent(q, start);
        assert_eq!(scheduler.next_slot(), Some(start + Duration::from_millis(500)));

        assert!(scheduler.poll(start + Duration::from_millis(499)).is_none());
        assert_eq!(
            scheduler.poll(start + Duration::from_millis(500)).unwrap().frame.seq,
            2
        );
    }

    #[test]
    fn test_two_failures_then_success_with_three_retries() {
        let mut scheduler = LinkScheduler::new(SchedulerConfig::default(), Duration::ZERO);
        let now = Instant::now();
        scheduler.enqueue(frame(1, 0, 1, MessageKind::ThermalSummary), now).unwrap();

        for _ in 0..2 {
            let q = scheduler.poll(now).unwrap();
            assert!(scheduler.on_failed(q, now).is_none());
        }
        let q = scheduler.poll(now).unwrap();
        assert_eq!(q.attempts, 3);
        scheduler.on_sent(q, now);

        assert_eq!(scheduler.stats().frames_sent, 1);
        assert_eq!(scheduler.stats().frames_retried, 2);
        assert_eq!(scheduler.stats().frames_failed, 0);
    }

    #[test]
    fn test_two_failures_drop_with_one_retry() {
        let config = SchedulerConfig {
            max_retries: 1,
            ..Default::default()
        };
        let mut scheduler = LinkScheduler::new(config, Duration::ZERO);
        let now = Instant::now();
        scheduler.enqueue(frame(7, 0, 1, MessageKind::ThermalSummary), now).unwrap();

        let q = scheduler.poll(now).unwrap();
        assert!(scheduler.on_failed(q, now).is_none());
        let q = scheduler.poll(now).unwrap();
        match scheduler.on_failed(q, now) {
            Some(LinkError::LinkSendFailed {
                seq,
                frag_index,
                attempts,
            }) => assert_eq!((seq, frag_index, attempts), (7, 0, 2)),
            other => panic!("expected LinkSendFailed, got {other:?}"),
        }
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.stats().frames_failed, 1);
    }

    #[test]
    fn test_retry_preserves_fragment_order() {
        let mut scheduler = LinkScheduler::new(SchedulerConfig::default(), Duration::ZERO);
        let now = Instant::now();
        for i in 0..3 {
            scheduler.enqueue(frame(1, i, 3, MessageKind::ThermalImage), now).unwrap();
        }

        let q = scheduler.poll(now).unwrap();
        scheduler.on_sent(q, now);
        let q = scheduler.poll(now).unwrap();
        assert_eq!(q.frame.frag_index, 1);
        scheduler.on_failed(q, now);

        assert_eq!(ids(&mut scheduler, now), vec![(1, 1), (1, 2)]);
    }

    #[test]
    fn test_newer_telemetry_purges_older() {
        let mut scheduler = LinkScheduler::new(SchedulerConfig::default(), Duration::ZERO);
        let now = Instant::now();

        scheduler.enqueue(frame(10, 0, 2, MessageKind::Telemetry), now).unwrap();
        scheduler.enqueue(frame(10, 1, 2, MessageKind::Telemetry), now).unwrap();
        scheduler.enqueue(frame(11, 0, 1, MessageKind::ThermalSummary), now).unwrap();
        scheduler.enqueue(frame(12, 0, 1, MessageKind::Telemetry), now).unwrap();

        // Late arrival of an older snapshot is dropped on enqueue.
        scheduler.enqueue(frame(10, 0, 2, MessageKind::Telemetry), now).unwrap();

        assert_eq!(ids(&mut scheduler, now), vec![(11, 0), (12, 0)]);
        assert_eq!(scheduler.stats().frames_superseded, 3);
    }

    #[test]
    fn test_failed_superseded_telemetry_is_not_retried() {
        let mut scheduler = LinkScheduler::new(SchedulerConfig::default(), Duration::ZERO);
        let now = Instant::now();

        scheduler.enqueue(frame(1, 0, 1, MessageKind::Telemetry), now).unwrap();
        let q = scheduler.poll(now).unwrap();
        scheduler.enqueue(frame(2, 0, 1, MessageKind::Telemetry), now).unwrap();

        assert!(scheduler.on_failed(q, now).is_none());
        assert_eq!(ids(&mut scheduler, now), vec![(2, 0)]);
    }

    #[test]
    fn test_high_overflow_drops_oldest() {
        let config = SchedulerConfig {
            high_capacity: 2,
            ..Default::default()
        };
        let mut scheduler = LinkScheduler::new(config, Duration::ZERO);
        let now = Instant::now();

        for seq in 1..=3 {
            scheduler.enqueue(frame(seq, 0, 1, MessageKind::ThermalSummary), now).unwrap();
        }

        assert_eq!(ids(&mut scheduler, now), vec![(2, 0), (3, 0)]);
        assert_eq!(scheduler.stats().frames_overflowed, 1);
    }

    #[test]
    fn test_bulk_overflow_rejects_new() {
        let config = SchedulerConfig {
            bulk_capacity: 1,
            ..Default::default()
        };
        let mut scheduler = LinkScheduler::new(config, Duration::ZERO);
        let now = Instant::now();

        scheduler.enqueue(frame(1, 0, 2, MessageKind::ThermalImage), now).unwrap();
        assert!(matches!(
            scheduler.enqueue(frame(1, 1, 2, MessageKind::ThermalImage), now),
            Err(LinkError::QueueFull)
        ));
        assert_eq!(scheduler.stats().frames_rejected, 1);
    }

    #[test]
    fn test_batch_rejected_whole_when_bulk_lacks_room() {
        let config = SchedulerConfig {
            bulk_capacity: 3,
            ..Default::default()
        };
        let mut scheduler = LinkScheduler::new(config, Duration::ZERO);
        let now = Instant::now();

        let image: Vec<_> = (0..5).map(|i| frame(1, i, 5, MessageKind::ThermalImage)).collect();
        assert!(matches!(
            scheduler.enqueue_batch(image, now),
            Err(LinkError::QueueFull)
        ));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.stats().frames_rejected, 5);
        assert_eq!(scheduler.stats().frames_enqueued, 0);

        // A smaller image that fits is admitted in full.
        let image: Vec<_> = (0..3).map(|i| frame(2, i, 3, MessageKind::ThermalImage)).collect();
        scheduler.enqueue_batch(image, now).unwrap();
        assert_eq!(ids(&mut scheduler, now), vec![(2, 0), (2, 1), (2, 2)]);
    }

    #[test]
    fn test_priority_of_kind() {
        assert_eq!(Priority::of(MessageKind::Telemetry), Priority::High);
        assert_eq!(Priority::of(MessageKind::ThermalSummary), Priority::High);
        assert_eq!(Priority::of(MessageKind::ThermalImage), Priority::Bulk);
    }

    #[test]
    fn test_abandon_bulk() {
        let mut scheduler = LinkScheduler::new(SchedulerConfig::default(), Duration::ZERO);
        let now = Instant::now();
        scheduler.enqueue(frame(1, 0, 1, MessageKind::ThermalImage), now).unwrap();
        scheduler.enqueue(frame(2, 0, 1, MessageKind::ThermalSummary), now).unwrap();

        assert_eq!(scheduler.abandon_bulk(), 1);
        assert_eq!(scheduler.queue_depths(), (1, 0));
    }
}
