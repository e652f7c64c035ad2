//! Ground station builder and runtime.
//!
//! The [`GroundStation`] runs two tasks:
//! 1. Receive: read frames from the radio into a bounded channel
//! 2. Process: decode frames, reassemble messages, decode records, and
//!    deliver them on a bounded output channel; a periodic tick expires
//!    stale reassembly buffers
//!
//! Per-frame and per-message failures are logged and counted, never fatal.
//!
//! # Example
//!
//! ```ignore
//! use lora_telemetry::GroundStation;
//!
//! let mut ground = GroundStation::builder().mtu(255).start(radio);
//! while let Some(record) = ground.next_record().await {
//!     println!("{:?}", record);
//! }
//! let report = ground.shutdown().await?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::codec::PayloadFormat;
use crate::error::{LinkError, Result};
use crate::protocol::{FrameCodec, Outcome, Reassembler, ReassemblyConfig, ReassemblyStats, DEFAULT_MTU};
use crate::telemetry::{DecoderStats, TelemetryDecoder, TelemetryRecord};
use crate::transport::{RadioError, RadioRx};

/// Default capacity of the raw frame channel.
pub const DEFAULT_FRAME_CAPACITY: usize = 256;

/// Default capacity of the record output channel.
pub const DEFAULT_RECORD_CAPACITY: usize = 256;

/// Default period of the reassembly expiry tick.
pub const DEFAULT_EXPIRY_TICK: Duration = Duration::from_secs(1);

/// Shortest accepted expiry tick.
pub const MIN_EXPIRY_TICK: Duration = Duration::from_millis(1);

/// Ground station configuration.
#[derive(Debug, Clone)]
pub struct GroundConfig {
    /// Channel MTU, header included. Must match the agent's radio.
    pub mtu: usize,
    /// Payload encoding. Must match the agent.
    pub format: PayloadFormat,
    /// Reassembly limits and timeout.
    pub reassembly: ReassemblyConfig,
    /// Raw frames buffered between the receive and processing tasks.
    pub frame_capacity: usize,
    /// Decoded records buffered for the consumer.
    pub record_capacity: usize,
    /// How often incomplete buffers are checked for expiry.
    pub expiry_tick: Duration,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            format: PayloadFormat::default(),
            reassembly: ReassemblyConfig::default(),
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            record_capacity: DEFAULT_RECORD_CAPACITY,
            expiry_tick: DEFAULT_EXPIRY_TICK,
        }
    }
}

/// Builder for configuring and starting a ground station.
pub struct GroundStationBuilder {
    config: GroundConfig,
}

impl GroundStationBuilder {
    /// Create a new ground station builder.
    pub fn new() -> Self {
        Self {
            config: GroundConfig::default(),
        }
    }

    /// Set the channel MTU.
    ///
    /// Default: 255
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.config.mtu = mtu;
        self
    }

    /// Set the payload encoding.
    pub fn payload_format(mut self, format: PayloadFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set the reassembly timeout.
    ///
    /// Default: 60 seconds
    pub fn reassembly_timeout(mut self, timeout: Duration) -> Self {
        self.config.reassembly.timeout = timeout;
        self
    }

    /// Set the maximum concurrent reassembly buffers.
    ///
    /// Default: 32
    pub fn max_buffers(mut self, max: usize) -> Self {
        self.config.reassembly.max_buffers = max;
        self
    }

    /// Set the output channel capacity.
    pub fn record_capacity(mut self, capacity: usize) -> Self {
        self.config.record_capacity = capacity;
        self
    }

    /// Set the expiry tick period, at least [`MIN_EXPIRY_TICK`].
    pub fn expiry_tick(mut self, period: Duration) -> Self {
        self.config.expiry_tick = period.max(MIN_EXPIRY_TICK);
        self
    }

    /// Start the ground station on a radio.
    ///
    /// Must be called within a tokio runtime.
    pub fn start<R: RadioRx>(self, radio: R) -> GroundStation {
        GroundStation::start(self.config, radio)
    }
}

impl Default for GroundStationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What the ground station did over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundReport {
    /// Transmissions read from the radio.
    pub frames_received: u64,
    /// Transmissions dropped because the processing task fell behind.
    pub frames_overflowed: u64,
    /// Transmissions the frame codec rejected.
    pub frames_rejected: u64,
    /// Records handed to the output channel.
    pub records_delivered: u64,
    /// Incomplete buffers abandoned at shutdown.
    pub buffers_abandoned: usize,
    /// Reassembler statistics.
    pub reassembly: ReassemblyStats,
    /// Decoder statistics.
    pub decoder: DecoderStats,
}

#[derive(Debug, Default)]
struct ReceiveReport {
    received: u64,
    overflowed: u64,
}

#[derive(Debug)]
struct ProcessReport {
    rejected: u64,
    delivered: u64,
    abandoned: usize,
    reassembly: ReassemblyStats,
    decoder: DecoderStats,
}

/// A running ground station.
pub struct GroundStation {
    records: mpsc::Receiver<TelemetryRecord>,
    stop_tx: oneshot::Sender<()>,
    receiver: JoinHandle<ReceiveReport>,
    processor: JoinHandle<ProcessReport>,
}

impl GroundStation {
    /// Create a new ground station builder.
    pub fn builder() -> GroundStationBuilder {
        GroundStationBuilder::new()
    }

    fn start<R: RadioRx>(config: GroundConfig, radio: R) -> Self {
        let (raw_tx, raw_rx) = mpsc::channel(config.frame_capacity.max(1));
        let (records_tx, records) = mpsc::channel(config.record_capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();

        tracing::info!(mtu = config.mtu, format = %config.format, "ground station started");

        let receiver = tokio::spawn(receive_loop(radio, raw_tx, stop_rx));
        let processor = tokio::spawn(process_loop(raw_rx, records_tx, config));

        GroundStation {
            records,
            stop_tx,
            receiver,
            processor,
        }
    }

    /// Wait for the next decoded record.
    ///
    /// Returns `None` once the radio has closed and every frame received
    /// before that has been processed.
    pub async fn next_record(&mut self) -> Option<TelemetryRecord> {
        self.records.recv().await
    }

    /// Take a record if one is ready.
    pub fn try_next_record(&mut self) -> Option<TelemetryRecord> {
        self.records.try_recv().ok()
    }

    /// Stop receiving, abandon incomplete buffers, and report.
    ///
    /// Records not yet taken are discarded.
    pub async fn shutdown(self) -> Result<GroundReport> {
        let GroundStation {
            records,
            stop_tx,
            receiver,
            processor,
        } = self;

        let _ = stop_tx.send(());
        drop(records);

        let received = receiver.await?;
        let processed = processor.await?;

        tracing::info!(
            frames = received.received,
            records = processed.delivered,
            abandoned = processed.abandoned,
            "ground station stopped"
        );

        Ok(GroundReport {
            frames_received: received.received,
            frames_overflowed: received.overflowed,
            frames_rejected: processed.rejected,
            records_delivered: processed.delivered,
            buffers_abandoned: processed.abandoned,
            reassembly: processed.reassembly,
            decoder: processed.decoder,
        })
    }
}

/// Receive loop: radio to the raw frame channel, never blocking on processing.
async fn receive_loop<R: RadioRx>(
    mut radio: R,
    raw_tx: mpsc::Sender<Bytes>,
    mut stop_rx: oneshot::Receiver<()>,
) -> ReceiveReport {
    let mut report = ReceiveReport::default();

    loop {
        let received = tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            received = radio.recv() => received,
        };

        match received {
            Ok(Some(frame)) => {
                report.received += 1;
                match raw_tx.try_send(frame) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        report.overflowed += 1;
                        tracing::warn!("processing behind, dropping received frame");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Ok(None) | Err(RadioError::Closed) => {
                tracing::info!("radio closed");
                break;
            }
            Err(e) => tracing::warn!("receive error: {}", e),
        }
    }

    report
}

/// Processing loop: frames to records, with periodic expiry.
async fn process_loop(
    mut raw_rx: mpsc::Receiver<Bytes>,
    records_tx: mpsc::Sender<TelemetryRecord>,
    config: GroundConfig,
) -> ProcessReport {
    let codec = FrameCodec::new(config.mtu);
    let mut reassembler = Reassembler::new(config.reassembly);
    let mut decoder = TelemetryDecoder::new(config.format);
    let mut expiry = tokio::time::interval(config.expiry_tick);
    expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut rejected: u64 = 0;
    let mut delivered: u64 = 0;

    loop {
        tokio::select! {
            raw = raw_rx.recv() => {
                let Some(raw) = raw else { break };

                let frame = match codec.decode(raw) {
                    Ok(frame) => frame,
                    Err(e) => {
                        rejected += 1;
                        tracing::debug!("frame rejected: {}", e);
                        continue;
                    }
                };

                let message = match reassembler.accept(frame, Instant::now()) {
                    Ok(Outcome::Complete(message)) => message,
                    Ok(outcome) => {
                        tracing::trace!(?outcome, "frame accepted");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("frame dropped: {}", e);
                        continue;
                    }
                };

                let record = match decoder.decode(&message) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        continue;
                    }
                };

                tracing::debug!(seq = record.seq(), kind = %record.kind(), "record decoded");
                if records_tx.send(record).await.is_ok() {
                    delivered += 1;
                }
            }
            _ = expiry.tick() => {
                for expired in reassembler.expire(Instant::now()) {
                    tracing::warn!("{}", LinkError::from(expired));
                }
            }
        }
    }

    let abandoned = reassembler.clear();
    if abandoned > 0 {
        tracing::info!(abandoned, "abandoning incomplete messages");
    }

    ProcessReport {
        rejected,
        delivered,
        abandoned,
        reassembly: reassembler.stats(),
        decoder: decoder.stats(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, Fragmenter};
    use crate::telemetry::{TelemetryEncoder, ThermalSummary};
    use crate::transport::{RadioTx, SimConfig, SimRadio};

    #[test]
    fn test_builder_configuration() {
        let builder = GroundStation::builder()
            .mtu(64)
            .payload_format(PayloadFormat::Json)
            .reassembly_timeout(Duration::from_secs(5))
            .max_buffers(4)
            .record_capacity(8)
            .expiry_tick(Duration::from_millis(100));

        assert_eq!(builder.config.mtu, 64);
        assert_eq!(builder.config.format, PayloadFormat::Json);
        assert_eq!(builder.config.reassembly.timeout, Duration::from_secs(5));
        assert_eq!(builder.config.reassembly.max_buffers, 4);
        assert_eq!(builder.config.record_capacity, 8);
        assert_eq!(builder.config.expiry_tick, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_expiry_tick_is_clamped() {
        let builder = GroundStation::builder().expiry_tick(Duration::ZERO);
        assert_eq!(builder.config.expiry_tick, MIN_EXPIRY_TICK);

        let (tx, rx, _control) = SimRadio::pair(SimConfig::default());
        let mut ground = builder.start(rx);
        drop(tx);

        assert_eq!(ground.next_record().await, None);
        ground.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ground_decodes_and_rejects_garbage() {
        let (mut tx, rx, _control) = SimRadio::pair(SimConfig::default());
        let mut ground = GroundStation::builder().start(rx);

        let mut encoder = TelemetryEncoder::new(PayloadFormat::MsgPack, Fragmenter::for_mtu(255));
        let summary = ThermalSummary {
            min: 20.0,
            max: 40.5,
            mean: 28.1,
        };
        let message = encoder.encode_summary(&summary).unwrap();

        tx.send(Bytes::from_static(b"noise")).await.unwrap();
        for frame in encoder.fragment(&message).unwrap() {
            tx.send(encode_frame(&frame, 255).unwrap()).await.unwrap();
        }
        tx.close().await.unwrap();

        assert_eq!(
            ground.next_record().await,
            Some(TelemetryRecord::ThermalSummary { seq: 1, summary })
        );
        assert_eq!(ground.next_record().await, None);

        let report = ground.shutdown().await.unwrap();
        assert_eq!(report.frames_received, 2);
        assert_eq!(report.frames_rejected, 1);
        assert_eq!(report.records_delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ground_expires_incomplete_messages() {
        let (mut tx, rx, _control) = SimRadio::pair(SimConfig::default());
        let mut ground = GroundStation::builder()
            .reassembly_timeout(Duration::from_secs(5))
            .start(rx);

        let mut encoder = TelemetryEncoder::new(PayloadFormat::MsgPack, Fragmenter::for_mtu(255));
        let image = crate::telemetry::ThermalImage {
            timestamp_ms: 0,
            width: 32,
            height: 24,
            pixels: vec![9; 768],
        };
        let message = encoder.encode_image(&image).unwrap();
        let first = encoder.fragment(&message).unwrap().next().unwrap();
        tx.send(encode_frame(&first, 255).unwrap()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(ground.try_next_record().is_none());

        let report = ground.shutdown().await.unwrap();
        assert_eq!(report.reassembly.buffers_expired, 1);
        assert_eq!(report.buffers_abandoned, 0);
        drop(tx);
    }
}
