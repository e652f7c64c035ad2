//! # lora-telemetry
//!
//! Telemetry link between a drone agent and a ground station over a
//! low-bandwidth, lossy LoRa channel.
//!
//! ## Architecture
//!
//! - **Agent**: samples vehicle and thermal sources, encodes records into
//!   sequenced logical messages, fragments them to the radio MTU, and hands
//!   the frames to a link task that schedules and transmits them
//! - **Ground station**: receives frames, checks them, reassembles messages
//!   in any arrival order, and decodes them into records
//!
//! Every frame carries a 16-byte big-endian header with a CRC-32 of its data.
//! Payloads are MessagePack by default, with a JSON fallback.
//!
//! ## Example
//!
//! ```ignore
//! use lora_telemetry::transport::{SimConfig, SimRadio};
//! use lora_telemetry::{Agent, GroundStation, SyntheticThermal, SyntheticVehicle};
//!
//! #[tokio::main]
//! async fn main() -> lora_telemetry::Result<()> {
//!     let (tx, rx, _control) = SimRadio::pair(SimConfig::default());
//!
//!     let mut ground = GroundStation::builder().start(rx);
//!     let agent = Agent::builder()
//!         .start(tx, SyntheticVehicle::default(), SyntheticThermal::default());
//!
//!     if let Some(record) = ground.next_record().await {
//!         println!("{:?}", record);
//!     }
//!
//!     agent.shutdown().await?;
//!     ground.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod link;
pub mod protocol;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod telemetry;
pub mod transport;

mod agent;
mod ground;

pub use agent::{Agent, AgentBuilder, AgentConfig, AgentReport};
pub use error::{LinkError, Result};
pub use ground::{GroundConfig, GroundReport, GroundStation, GroundStationBuilder};
pub use source::{SyntheticThermal, SyntheticVehicle, ThermalSource, VehicleSource};
pub use telemetry::TelemetryRecord;
