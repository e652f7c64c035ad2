//! Transport module - radio capabilities and their implementations.
//!
//! The link only sees two capabilities:
//! - [`RadioTx`]: transmit one frame, report MTU and minimum interval
//! - [`RadioRx`]: receive the next frame, `None` once the radio is closed
//!
//! Provided implementations:
//! - [`SimRadio`]: in-memory channel with deterministic fault injection
//! - [`UdpRadio`]: datagram bridge to a LoRa gateway or packet forwarder

mod sim;
mod udp;

pub use sim::{Fault, SimConfig, SimControl, SimRadio, SimRx, SimTx};
pub use udp::{UdpRadio, UdpRx, UdpTx};

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum RadioError {
    /// I/O error on the underlying device or socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The radio was closed.
    #[error("radio closed")]
    Closed,

    /// The radio refused this transmission; it may succeed if retried.
    #[error("transmission rejected: {0}")]
    Rejected(String),
}

/// Transmit half of a radio.
///
/// Only the link task owns it; one frame is in flight at a time.
pub trait RadioTx: Send + 'static {
    /// Transmit one encoded frame.
    fn send(&mut self, frame: Bytes) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// Largest transmission in bytes, header included.
    fn mtu(&self) -> usize;

    /// Minimum time between two transmissions.
    fn min_interval(&self) -> Duration;

    /// Release the radio. Called once after the last transmission.
    fn close(&mut self) -> impl Future<Output = Result<(), RadioError>> + Send {
        async { Ok(()) }
    }
}

/// Receive half of a radio.
pub trait RadioRx: Send + 'static {
    /// Wait for the next received frame. `Ok(None)` means the radio closed.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Bytes>, RadioError>> + Send;
}
