//! Telemetry encoder: samples to sequenced, fragmented messages.

use bytes::Bytes;

use super::{Sample, ThermalImage, ThermalSummary, VehicleState};
use crate::codec::PayloadFormat;
use crate::error::{LinkError, Result};
use crate::protocol::{Fragmenter, Fragments, LogicalMessage, MessageKind, SeqCounter};

/// Encoder statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EncoderStats {
    /// Logical messages built.
    pub messages_built: u64,
    /// Frames produced by fragmentation.
    pub frames_built: u64,
    /// Messages dropped because they need too many fragments.
    pub too_large: u64,
    /// Messages dropped because the payload failed to serialize.
    pub encode_failures: u64,
    /// Times the sequence counter wrapped.
    pub seq_wraps: u64,
}

/// Builds logical messages from samples.
///
/// Owns the agent's sequence counter: every message of every kind takes the
/// next value, so the ground can detect gaps across kinds.
pub struct TelemetryEncoder {
    counter: SeqCounter,
    format: PayloadFormat,
    fragmenter: Fragmenter,
    stats: EncoderStats,
}

impl TelemetryEncoder {
    /// Create an encoder.
    pub fn new(format: PayloadFormat, fragmenter: Fragmenter) -> Self {
        Self::with_counter(format, fragmenter, SeqCounter::new())
    }

    /// Create an encoder continuing from an existing counter.
    pub fn with_counter(format: PayloadFormat, fragmenter: Fragmenter, counter: SeqCounter) -> Self {
        Self {
            counter,
            format,
            fragmenter,
            stats: EncoderStats::default(),
        }
    }

    /// Payload format in use.
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Sequence number the next message will get.
    pub fn next_seq(&self) -> u32 {
        self.counter.peek()
    }

    /// Get statistics.
    pub fn stats(&self) -> EncoderStats {
        let mut stats = self.stats.clone();
        stats.seq_wraps = self.counter.wraps();
        stats
    }

    /// Build a Telemetry message.
    pub fn encode_vehicle(&mut self, state: &VehicleState) -> Result<LogicalMessage> {
        self.build(MessageKind::Telemetry, state)
    }

    /// Build a ThermalSummary message.
    pub fn encode_summary(&mut self, summary: &ThermalSummary) -> Result<LogicalMessage> {
        self.build(MessageKind::ThermalSummary, summary)
    }

    /// Build a ThermalImage message.
    pub fn encode_image(&mut self, image: &ThermalImage) -> Result<LogicalMessage> {
        self.build(MessageKind::ThermalImage, image)
    }

    /// Fragment a message, counting oversized ones.
    ///
    /// # Errors
    ///
    /// `MessageTooLarge` if the message cannot be sent on this channel.
    pub fn fragment(&mut self, message: &LogicalMessage) -> Result<Fragments> {
        match self.fragmenter.fragment(message) {
            Ok(fragments) => {
                self.stats.frames_built += fragments.len() as u64;
                Ok(fragments)
            }
            Err(e) => {
                if matches!(e, LinkError::MessageTooLarge { .. }) {
                    self.stats.too_large += 1;
                }
                Err(e)
            }
        }
    }

    /// Encode and fragment everything one tick produced.
    ///
    /// Order is Telemetry, ThermalSummary, then ThermalImage if present.
    /// Messages that fail to encode or fragment are dropped and logged;
    /// the rest of the tick is unaffected.
    pub fn encode_tick(&mut self, sample: &Sample) -> Vec<Fragments> {
        let mut out = Vec::with_capacity(3);

        let messages = [
            self.encode_vehicle(&sample.vehicle),
            self.encode_summary(&sample.summary),
        ];
        let image = sample.image.as_ref().map(|image| self.encode_image(image));

        for message in messages.into_iter().chain(image) {
            let fragments = message.and_then(|m| self.fragment(&m));
            match fragments {
                Ok(fragments) => out.push(fragments),
                Err(e) => tracing::warn!("dropping message: {}", e),
            }
        }

        out
    }

    fn build<T: serde::Serialize>(&mut self, kind: MessageKind, value: &T) -> Result<LogicalMessage> {
        let payload = match self.format.encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.encode_failures += 1;
                return Err(e);
            }
        };

        let seq = self.counter.advance();
        self.stats.messages_built += 1;
        tracing::debug!(seq, %kind, len = payload.len(), "built message");

        Ok(LogicalMessage::new(seq, kind, Bytes::from(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle() -> VehicleState {
        VehicleState {
            timestamp_ms: 1_700_000_000_000,
            lat: Some(47.397_742),
            lon: Some(8.545_594),
            alt: Some(488.2),
            heading: 90.0,
            groundspeed: 4.5,
            battery_mv: Some(12_100),
        }
    }

    fn summary() -> ThermalSummary {
        ThermalSummary {
            min: 20.0,
            max: 40.5,
            mean: 28.1,
        }
    }

    fn image(len: usize) -> ThermalImage {
        ThermalImage {
            timestamp_ms: 1,
            width: 32,
            height: (len / 32) as u16,
            pixels: vec![0x55; len],
        }
    }

    #[test]
    fn test_seq_shared_across_kinds() {
        let mut encoder = TelemetryEncoder::new(PayloadFormat::MsgPack, Fragmenter::for_mtu(255));

        let a = encoder.encode_vehicle(&vehicle()).unwrap();
        let b = encoder.encode_summary(&summary()).unwrap();
        let c = encoder.encode_image(&image(64)).unwrap();

        assert_eq!((a.seq, b.seq, c.seq), (1, 2, 3));
        assert_eq!(a.kind, MessageKind::Telemetry);
        assert_eq!(b.kind, MessageKind::ThermalSummary);
        assert_eq!(c.kind, MessageKind::ThermalImage);
        assert_eq!(encoder.next_seq(), 4);
    }

    #[test]
    fn test_summary_fits_in_one_frame() {
        let mut encoder = TelemetryEncoder::new(PayloadFormat::MsgPack, Fragmenter::for_mtu(32));
        let message = encoder.encode_summary(&summary()).unwrap();
        assert_eq!(encoder.fragment(&message).unwrap().len(), 1);
    }

    #[test]
    fn test_encode_tick_without_image() {
        let mut encoder = TelemetryEncoder::new(PayloadFormat::MsgPack, Fragmenter::for_mtu(255));
        let sample = Sample {
            vehicle: vehicle(),
            summary: summary(),
            image: None,
        };

        let batches = encoder.encode_tick(&sample);
        let kinds: Vec<_> = batches.iter().map(Fragments::kind).collect();
        assert_eq!(kinds, vec![MessageKind::Telemetry, MessageKind::ThermalSummary]);
        assert_eq!(encoder.stats().messages_built, 2);
    }

    #[test]
    fn test_encode_tick_fragments_image() {
        let mut encoder = TelemetryEncoder::new(PayloadFormat::MsgPack, Fragmenter::for_mtu(255));
        let sample = Sample {
            vehicle: vehicle(),
            summary: summary(),
            image: Some(image(768)),
        };

        let batches = encoder.encode_tick(&sample);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].kind(), MessageKind::ThermalImage);
        assert!(batches[2].frag_count() > 1);
        assert_eq!(
            encoder.stats().frames_built,
            batches.iter().map(|b| b.len() as u64).sum::<u64>()
        );
    }

    #[test]
    fn test_too_large_image_is_dropped_and_counted() {
        let mut encoder = TelemetryEncoder::new(PayloadFormat::MsgPack, Fragmenter::new(1));
        let sample = Sample {
            vehicle: vehicle(),
            summary: summary(),
            image: Some(image(70_000)),
        };

        let batches = encoder.encode_tick(&sample);
        assert_eq!(batches.len(), 2);
        assert_eq!(encoder.stats().too_large, 1);
    }

    #[test]
    fn test_json_payload_is_readable() {
        let mut encoder = TelemetryEncoder::new(PayloadFormat::Json, Fragmenter::for_mtu(255));
        let message = encoder.encode_summary(&summary()).unwrap();
        let text = std::str::from_utf8(&message.payload).unwrap();
        assert!(text.contains("\"max\":40.5"));
    }

    #[test]
    fn test_counter_wrap_is_counted() {
        let mut encoder = TelemetryEncoder::with_counter(
            PayloadFormat::MsgPack,
            Fragmenter::for_mtu(255),
            SeqCounter::starting_at(u32::MAX),
        );

        assert_eq!(encoder.encode_summary(&summary()).unwrap().seq, u32::MAX);
        assert_eq!(encoder.encode_summary(&summary()).unwrap().seq, 0);
        assert_eq!(encoder.stats().seq_wraps, 1);
    }
}
