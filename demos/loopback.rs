//! Loopback demo - agent and ground station over a simulated radio.
//!
//! This example demonstrates:
//! - Starting an agent with synthetic sources using the builder pattern
//! - Injecting loss, corruption and reordering on the simulated link
//! - Writing decoded records to stdout as JSON lines
//!
//! # Running
//!
//! ```text
//! RUST_LOG=lora_telemetry=debug cargo run --example loopback
//! ```
//!
//! Logs go to stderr; stdout carries one JSON record per line.

use std::time::Duration;

use lora_telemetry::sink::JsonLineSink;
use lora_telemetry::transport::{Fault, SimConfig, SimRadio};
use lora_telemetry::{Agent, GroundStation, SyntheticThermal, SyntheticVehicle};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (tx, rx, control) = SimRadio::pair(SimConfig {
        mtu: 64,
        min_interval: Duration::from_millis(20),
    });

    // A lossy afternoon: one corrupted frame, one lost, one late.
    control.set_fault(1, Fault::Corrupt);
    control.set_fault(6, Fault::Drop);
    control.set_fault(9, Fault::Hold(4));

    let mut ground = GroundStation::builder()
        .mtu(64)
        .reassembly_timeout(Duration::from_secs(5))
        .start(rx);

    let agent = Agent::builder()
        .sample_interval(Duration::from_millis(500))
        .image_every(4)
        .start(tx, SyntheticVehicle::default(), SyntheticThermal::new(16, 12));

    let mut sink = JsonLineSink::stdout();
    let run_for = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(run_for);

    loop {
        tokio::select! {
            _ = &mut run_for => break,
            _ = tokio::signal::ctrl_c() => break,
            record = ground.next_record() => match record {
                Some(record) => sink.write_record(&record)?,
                None => break,
            },
        }
    }

    let agent_report = agent.shutdown().await?;
    while let Some(record) = ground.next_record().await {
        sink.write_record(&record)?;
    }
    let ground_report = ground.shutdown().await?;

    tracing::info!(?agent_report, "agent finished");
    tracing::info!(?ground_report, "ground finished");
    Ok(())
}
