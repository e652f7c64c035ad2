//! Telemetry records and their payload encoding.
//!
//! - [`TelemetryEncoder`] - turns samples into sequenced, fragmented messages
//! - [`TelemetryDecoder`] - turns completed messages back into records
//!
//! Payloads carry only the record body; the sequence number and kind travel
//! in the frame header.

mod decoder;
mod encoder;

pub use decoder::{DecoderStats, GapTracker, TelemetryDecoder};
pub use encoder::{EncoderStats, TelemetryEncoder};

use serde::{Deserialize, Serialize};

use crate::protocol::MessageKind;

/// Vehicle state snapshot. Absent sensors are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Sample time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Altitude in meters.
    pub alt: Option<f64>,
    /// Heading in degrees.
    pub heading: f32,
    /// Ground speed in m/s.
    pub groundspeed: f32,
    /// Battery voltage in millivolts.
    pub battery_mv: Option<u32>,
}

/// Thermal camera summary in degrees Celsius. Always fits in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalSummary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Raw thermal image with its geometry. Pixels are opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermalImage {
    pub timestamp_ms: u64,
    pub width: u16,
    pub height: u16,
    #[serde(with = "serde_bytes")]
    pub pixels: Vec<u8>,
}

/// One tick's worth of sampled data.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub vehicle: VehicleState,
    pub summary: ThermalSummary,
    pub image: Option<ThermalImage>,
}

/// A decoded message as delivered to the ground output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Vehicle { seq: u32, state: VehicleState },
    ThermalSummary { seq: u32, summary: ThermalSummary },
    ThermalImage { seq: u32, image: ThermalImage },
}

impl TelemetryRecord {
    /// Sequence number of the message this record came from.
    pub fn seq(&self) -> u32 {
        match self {
            TelemetryRecord::Vehicle { seq, .. }
            | TelemetryRecord::ThermalSummary { seq, .. }
            | TelemetryRecord::ThermalImage { seq, .. } => *seq,
        }
    }

    /// Message kind of this record.
    pub fn kind(&self) -> MessageKind {
        match self {
            TelemetryRecord::Vehicle { .. } => MessageKind::Telemetry,
            TelemetryRecord::ThermalSummary { .. } => MessageKind::ThermalSummary,
            TelemetryRecord::ThermalImage { .. } => MessageKind::ThermalImage,
        }
    }
}
