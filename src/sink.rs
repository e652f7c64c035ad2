//! JSON-lines output for decoded records.
//!
//! Each record becomes one JSON object followed by a single `\n`, flushed
//! immediately so a downstream reader sees complete lines. Logs belong on
//! stderr; stdout carries records only.
//!
//! # Example
//!
//! ```
//! use lora_telemetry::sink::JsonLineSink;
//! use lora_telemetry::telemetry::{TelemetryRecord, ThermalSummary};
//!
//! let mut sink = JsonLineSink::new(Vec::new());
//! let summary = ThermalSummary { min: 20.0, max: 40.5, mean: 28.0 };
//! sink.write_record(&TelemetryRecord::ThermalSummary { seq: 2, summary }).unwrap();
//!
//! let line = String::from_utf8(sink.into_inner()).unwrap();
//! assert!(line.starts_with(r#"{"kind":"thermal_summary","seq":2"#));
//! ```

use std::io::{Stdout, Write};

use crate::error::Result;
use crate::telemetry::TelemetryRecord;

/// Writes records as JSON lines to any writer.
pub struct JsonLineSink<W: Write> {
    writer: W,
    written: u64,
}

impl JsonLineSink<Stdout> {
    /// Sink writing to stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> JsonLineSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Write one record as a line and flush.
    ///
    /// Uses an explicit `\n` rather than `writeln!` so line endings are the
    /// same on every platform.
    pub fn write_record(&mut self, record: &TelemetryRecord) -> Result<()> {
        let json = serde_json::to_vec(record)?;
        self.writer.write_all(&json)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
