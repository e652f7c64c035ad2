//! Telemetry decoder: completed messages to records, plus gap tracking.

use super::{TelemetryRecord, ThermalImage, ThermalSummary, VehicleState};
use crate::codec::PayloadFormat;
use crate::error::{LinkError, Result};
use crate::protocol::{seq_distance, seq_newer, LogicalMessage, MessageKind};

/// Tracks sequence gaps in the stream of decoded messages.
///
/// A forward jump counts the skipped seqs as missed. A message older than
/// the highest seen fills one of those gaps: it counts as late and reduces
/// the missed count.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GapTracker {
    highest: Option<u32>,
    received: u64,
    missed: u64,
    late: u64,
}

impl GapTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivered sequence number.
    pub fn observe(&mut self, seq: u32) {
        self.received += 1;
        match self.highest {
            None => self.highest = Some(seq),
            Some(highest) if seq_newer(seq, highest) => {
                let skipped = seq_distance(highest, seq) - 1;
                if skipped > 0 {
                    tracing::debug!(from = highest, to = seq, skipped, "sequence gap");
                }
                self.missed += u64::from(skipped);
                self.highest = Some(seq);
            }
            Some(_) => {
                self.late += 1;
                self.missed = self.missed.saturating_sub(1);
            }
        }
    }

    /// Highest sequence number delivered so far.
    pub fn highest(&self) -> Option<u32> {
        self.highest
    }

    /// Messages delivered.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Seqs skipped and not (yet) delivered late.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Messages delivered after a newer one.
    pub fn late(&self) -> u64 {
        self.late
    }
}

/// Decoder statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecoderStats {
    /// Records decoded.
    pub decoded: u64,
    /// Messages whose payload failed to decode.
    pub malformed: u64,
    /// Seqs skipped and never delivered.
    pub missed: u64,
    /// Messages delivered after a newer one.
    pub late: u64,
}

/// Decodes completed logical messages into telemetry records.
pub struct TelemetryDecoder {
    format: PayloadFormat,
    gaps: GapTracker,
    stats: DecoderStats,
}

impl TelemetryDecoder {
    /// Create a decoder for the given payload format.
    pub fn new(format: PayloadFormat) -> Self {
        Self {
            format,
            gaps: GapTracker::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Gap tracker state.
    pub fn gaps(&self) -> &GapTracker {
        &self.gaps
    }

    /// Get statistics.
    pub fn stats(&self) -> DecoderStats {
        let mut stats = self.stats.clone();
        stats.missed = self.gaps.missed();
        stats.late = self.gaps.late();
        stats
    }

    /// Decode one completed message.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` if the payload does not decode as its kind. Only
    /// this message is lost.
    pub fn decode(&mut self, message: &LogicalMessage) -> Result<TelemetryRecord> {
        let seq = message.seq;
        let record = match message.kind {
            MessageKind::Telemetry => self
                .decode_payload::<VehicleState>(message)
                .map(|state| TelemetryRecord::Vehicle { seq, state }),
            MessageKind::ThermalSummary => self
                .decode_payload::<ThermalSummary>(message)
                .map(|summary| TelemetryRecord::ThermalSummary { seq, summary }),
            MessageKind::ThermalImage => self
                .decode_payload::<ThermalImage>(message)
                .map(|image| TelemetryRecord::ThermalImage { seq, image }),
        };

        match record {
            Ok(record) => {
                self.gaps.observe(seq);
                self.stats.decoded += 1;
                Ok(record)
            }
            Err(e) => {
                self.stats.malformed += 1;
                Err(e)
            }
        }
    }

    fn decode_payload<T: serde::de::DeserializeOwned>(&self, message: &LogicalMessage) -> Result<T> {
        self.format
            .decode(&message.payload)
            .map_err(|e| LinkError::MalformedPayload {
                seq: message.seq,
                kind: message.kind,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Fragmenter;
    use crate::telemetry::TelemetryEncoder;

    fn state() -> VehicleState {
        VehicleState {
            timestamp_ms: 42,
            lat: None,
            lon: None,
            alt: Some(100.0),
            heading: 180.0,
            groundspeed: 0.0,
            battery_mv: None,
        }
    }

    #[test]
    fn test_decode_each_kind() {
        for format in [PayloadFormat::MsgPack, PayloadFormat::Json] {
            let mut encoder = TelemetryEncoder::new(format, Fragmenter::for_mtu(255));
            let mut decoder = TelemetryDecoder::new(format);

            let vehicle = encoder.encode_vehicle(&state()).unwrap();
            assert_eq!(
                decoder.decode(&vehicle).unwrap(),
                TelemetryRecord::Vehicle {
                    seq: 1,
                    state: state()
                }
            );

            let summary = ThermalSummary {
                min: 1.5,
                max: 2.5,
                mean: 2.0,
            };
            let message = encoder.encode_summary(&summary).unwrap();
            assert_eq!(
                decoder.decode(&message).unwrap(),
                TelemetryRecord::ThermalSummary { seq: 2, summary }
            );

            let image = ThermalImage {
                timestamp_ms: 7,
                width: 2,
                height: 2,
                pixels: vec![1, 2, 3, 4],
            };
            let message = encoder.encode_image(&image).unwrap();
            assert_eq!(
                decoder.decode(&message).unwrap(),
                TelemetryRecord::ThermalImage { seq: 3, image }
            );
        }
    }

    #[test]
    fn test_malformed_payload() {
        let mut decoder = TelemetryDecoder::new(PayloadFormat::MsgPack);
        let message = LogicalMessage::new(9, MessageKind::Telemetry, vec![0xc1, 0x00]);

        match decoder.decode(&message) {
            Err(LinkError::MalformedPayload { seq, kind, .. }) => {
                assert_eq!(seq, 9);
                assert_eq!(kind, MessageKind::Telemetry);
            }
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
        assert_eq!(decoder.stats().malformed, 1);
        assert_eq!(decoder.gaps().received(), 0);
    }

    #[test]
    fn test_kind_mismatch_is_malformed() {
        let mut encoder = TelemetryEncoder::new(PayloadFormat::MsgPack, Fragmenter::for_mtu(255));
        let mut decoder = TelemetryDecoder::new(PayloadFormat::MsgPack);

        let mut message = encoder.encode_vehicle(&state()).unwrap();
        message.kind = MessageKind::ThermalSummary;
        assert!(matches!(
            decoder.decode(&message),
            Err(LinkError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_gap_tracker_counts_missed_and_late() {
        let mut gaps = GapTracker::new();
        gaps.observe(1);
        gaps.observe(2);
        gaps.observe(5);
        assert_eq!(gaps.missed(), 2);
        assert_eq!(gaps.highest(), Some(5));

        gaps.observe(4);
        assert_eq!(gaps.late(), 1);
        assert_eq!(gaps.missed(), 1);
        assert_eq!(gaps.highest(), Some(5));
        assert_eq!(gaps.received(), 4);
    }

    #[test]
    fn test_gap_tracker_across_wrap() {
        let mut gaps = GapTracker::new();
        gaps.observe(u32::MAX - 1);
        gaps.observe(1);
        assert_eq!(gaps.missed(), 2);
        assert_eq!(gaps.highest(), Some(1));
    }
}
