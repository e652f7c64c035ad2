//! Dedicated link task owning the radio transmit half.
//!
//! Producers hand messages to the link task through a bounded mpsc channel,
//! one channel slot per message with all of its fragments. The task feeds
//! them to the [`LinkScheduler`] and transmits one frame at a time, paced by
//! the radio's minimum interval.
//!
//! # Architecture
//!
//! ```text
//! Sampler ─► LinkHandle::try_enqueue_message ─► mpsc ─► Link Task ─► LinkScheduler ─► RadioTx
//! ```
//!
//! The producer never waits on radio I/O: a full channel drops the whole
//! message and counts its frames.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::{LinkError, Result};
use crate::protocol::{encode_frame, Fragments, Frame};
use crate::scheduler::{LinkScheduler, QueuedFrame, SchedulerConfig, SchedulerStats};
use crate::transport::{RadioError, RadioTx};

/// Default capacity of the producer channel, in messages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// What the link task does with queued frames when producers are gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Transmit everything still queued, then close the radio.
    #[default]
    Drain,
    /// Discard queued ThermalImage fragments, transmit the rest.
    AbandonBulk,
}

/// Configuration for the link task.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Scheduler queues, fairness and retries.
    pub scheduler: SchedulerConfig,
    /// Channel capacity between producers and the link task, in messages.
    pub channel_capacity: usize,
    /// Behavior once every [`LinkHandle`] is dropped.
    pub shutdown: ShutdownPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            shutdown: ShutdownPolicy::default(),
        }
    }
}

/// Handle for handing frames to the link task.
///
/// Cheap to clone. The link task shuts down once every handle is dropped.
#[derive(Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<Vec<Frame>>,
    /// Frames in the channel, not yet picked up by the link task.
    pending: Arc<AtomicUsize>,
    /// Frames refused because the channel was full.
    dropped: Arc<AtomicU64>,
}

impl LinkHandle {
    /// Hand a single frame over without waiting.
    ///
    /// # Errors
    ///
    /// `QueueFull` if the channel is full (the frame is dropped and counted),
    /// `ChannelClosed` if the link task is gone.
    pub fn try_enqueue(&self, frame: Frame) -> Result<()> {
        self.try_send_batch(vec![frame])
    }

    /// Hand every fragment of a message over without waiting.
    ///
    /// The message takes one channel slot; it is queued whole or dropped
    /// whole.
    ///
    /// # Errors
    ///
    /// Same as [`try_enqueue`](Self::try_enqueue); on `QueueFull` every
    /// fragment counts as dropped.
    pub fn try_enqueue_message(&self, fragments: Fragments) -> Result<()> {
        self.try_send_batch(fragments.collect())
    }

    /// Hand a single frame over, waiting for channel space.
    pub async fn enqueue(&self, frame: Frame) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(vec![frame]).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            LinkError::ChannelClosed
        })
    }

    fn try_send_batch(&self, frames: Vec<Frame>) -> Result<()> {
        let count = frames.len();
        self.pending.fetch_add(count, Ordering::AcqRel);

        self.tx.try_send(frames).map_err(|e| {
            self.pending.fetch_sub(count, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    self.dropped.fetch_add(count as u64, Ordering::Relaxed);
                    LinkError::QueueFull
                }
                mpsc::error::TrySendError::Closed(_) => LinkError::ChannelClosed,
            }
        })
    }

    /// Frames waiting in the channel.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Frames dropped on a full channel.
    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawn the link task and return a handle for enqueuing frames.
///
/// The `JoinHandle` resolves once every handle is dropped and the queues are
/// drained (or bulk abandoned), after the radio has been closed.
pub fn spawn_link_task<R>(
    radio: R,
    config: LinkConfig,
) -> (LinkHandle, JoinHandle<Result<SchedulerStats>>)
where
    R: RadioTx,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = LinkHandle {
        tx,
        pending: pending.clone(),
        dropped: Arc::new(AtomicU64::new(0)),
    };

    let scheduler = LinkScheduler::new(config.scheduler, radio.min_interval());
    let task = tokio::spawn(link_loop(rx, radio, scheduler, pending, config.shutdown));

    (handle, task)
}

/// Main link loop.
async fn link_loop<R>(
    mut rx: mpsc::Receiver<Vec<Frame>>,
    mut radio: R,
    mut scheduler: LinkScheduler,
    pending: Arc<AtomicUsize>,
    policy: ShutdownPolicy,
) -> Result<SchedulerStats>
where
    R: RadioTx,
{
    let mtu = radio.mtu();
    let mut open = true;

    loop {
        while let Ok(frames) = rx.try_recv() {
            intake(&mut scheduler, &pending, frames);
        }

        if let Some(queued) = scheduler.poll(Instant::now()) {
            transmit(&mut radio, &mut scheduler, queued, mtu).await?;
            continue;
        }

        if !open {
            if scheduler.is_empty() {
                break;
            }
            match scheduler.next_slot() {
                Some(slot) => sleep_until(slot).await,
                None => break,
            }
            continue;
        }

        let slot = if scheduler.is_empty() {
            None
        } else {
            scheduler.next_slot()
        };

        tokio::select! {
            frames = rx.recv() => match frames {
                Some(frames) => intake(&mut scheduler, &pending, frames),
                None => {
                    open = false;
                    if policy == ShutdownPolicy::AbandonBulk {
                        let abandoned = scheduler.abandon_bulk();
                        if abandoned > 0 {
                            tracing::info!(abandoned, "abandoning queued image fragments");
                        }
                    }
                    tracing::debug!(queued = scheduler.len(), "producers gone, draining link");
                }
            },
            _ = sleep_until(slot.unwrap_or_else(Instant::now)), if slot.is_some() => {}
        }
    }

    radio.close().await?;
    let stats = scheduler.stats().clone();
    tracing::info!(
        sent = stats.frames_sent,
        failed = stats.frames_failed,
        "link closed"
    );
    Ok(stats)
}

fn intake(scheduler: &mut LinkScheduler, pending: &AtomicUsize, frames: Vec<Frame>) {
    pending.fetch_sub(frames.len(), Ordering::Release);
    if let Err(e) = scheduler.enqueue_batch(frames, Instant::now()) {
        tracing::warn!("message not queued: {}", e);
    }
}

/// Transmit one frame and report the outcome to the scheduler.
///
/// Only a closed radio is fatal; every other failure is retried or dropped
/// by the scheduler.
async fn transmit<R>(
    radio: &mut R,
    scheduler: &mut LinkScheduler,
    queued: QueuedFrame,
    mtu: usize,
) -> Result<()>
where
    R: RadioTx,
{
    let wire = match encode_frame(&queued.frame, mtu) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::error!(seq = queued.frame.seq, "unencodable frame dropped: {}", e);
            return Ok(());
        }
    };

    match radio.send(wire).await {
        Ok(()) => {
            scheduler.on_sent(queued, Instant::now());
            Ok(())
        }
        Err(RadioError::Closed) => {
            tracing::error!("radio closed under the link task");
            Err(LinkError::Radio(RadioError::Closed))
        }
        Err(e) => {
            tracing::warn!(
                seq = queued.frame.seq,
                frag_index = queued.frame.frag_index,
                attempt = queued.attempts,
                "send failed: {}",
                e
            );
            if let Some(failure) = scheduler.on_failed(queued, Instant::now()) {
                tracing::warn!("{}", failure);
            }
            Ok(())
        }
    }
}
