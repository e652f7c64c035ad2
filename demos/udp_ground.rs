//! UDP demo - ground station (and optionally an agent) over a gateway bridge.
//!
//! Each frame travels as one UDP datagram, as a LoRa packet forwarder would
//! relay it.
//!
//! # Running
//!
//! Ground station, printing JSON lines:
//!
//! ```text
//! cargo run --example udp_ground -- ground 127.0.0.1:7400
//! ```
//!
//! Agent with synthetic sources, sending to the ground station:
//!
//! ```text
//! cargo run --example udp_ground -- agent 127.0.0.1:0 127.0.0.1:7400
//! ```

use std::time::Duration;

use lora_telemetry::sink::JsonLineSink;
use lora_telemetry::transport::UdpRadio;
use lora_telemetry::{Agent, GroundStation, SyntheticThermal, SyntheticVehicle};
use tracing_subscriber::EnvFilter;

const MTU: usize = 255;

fn usage() -> ! {
    eprintln!("usage: udp_ground ground <bind>");
    eprintln!("       udp_ground agent <bind> <peer>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["ground", bind] => run_ground(bind).await,
        ["agent", bind, peer] => run_agent(bind, peer).await,
        _ => usage(),
    }
}

async fn run_ground(bind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let radio = UdpRadio::bind(bind).await?.with_mtu(MTU);
    tracing::info!(addr = %radio.local_addr()?, "listening");

    let mut ground = GroundStation::builder().mtu(MTU).start(radio.receiver());
    let mut sink = JsonLineSink::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            record = ground.next_record() => match record {
                Some(record) => sink.write_record(&record)?,
                None => break,
            },
        }
    }

    let report = ground.shutdown().await?;
    tracing::info!(?report, "ground finished");
    Ok(())
}

async fn run_agent(bind: &str, peer: &str) -> Result<(), Box<dyn std::error::Error>> {
    let radio = UdpRadio::bind(bind)
        .await?
        .with_mtu(MTU)
        .with_min_interval(Duration::from_millis(50));
    let tx = radio.sender(peer.parse()?);

    let agent = Agent::builder().start(tx, SyntheticVehicle::default(), SyntheticThermal::default());

    tokio::signal::ctrl_c().await?;
    let report = agent.shutdown().await?;
    tracing::info!(?report, "agent finished");
    Ok(())
}
