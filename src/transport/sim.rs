//! In-memory radio for tests and demos.
//!
//! A [`SimRadio`] pair is a one-way channel from a [`SimTx`] to a [`SimRx`].
//! Faults are scripted per transmission index through [`SimControl`], so every
//! run is deterministic:
//!
//! - drop a transmission
//! - corrupt one byte of it
//! - hold it back until later transmissions have been delivered
//! - make the next `n` calls to `send` fail
//!
//! # Example
//!
//! ```
//! use lora_telemetry::transport::{Fault, SimConfig, SimRadio};
//!
//! let (tx, rx, control) = SimRadio::pair(SimConfig::default());
//! control.set_fault(0, Fault::Drop);
//! control.fail_next_sends(2);
//! # drop((tx, rx));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use super::{RadioError, RadioRx, RadioTx};
use crate::protocol::DEFAULT_MTU;

/// What happens to one transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Delivered unchanged.
    Deliver,
    /// Lost on air.
    Drop,
    /// Delivered with its last byte inverted.
    Corrupt,
    /// Delivered after this many later transmissions.
    Hold(u64),
}

/// Simulated radio parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub mtu: usize,
    pub min_interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            min_interval: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    attempts: u64,
    transmissions: u64,
    fail_next: u32,
    faults: HashMap<u64, Fault>,
    held: Vec<(u64, Bytes)>,
    log: Vec<Bytes>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Constructor for simulated radio pairs.
pub struct SimRadio;

impl SimRadio {
    /// Create a connected transmit/receive pair and its control handle.
    pub fn pair(config: SimConfig) -> (SimTx, SimRx, SimControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SimState::default()));

        let sender = SimTx {
            tx: Some(tx),
            state: state.clone(),
            mtu: config.mtu,
            min_interval: config.min_interval,
        };

        (sender, SimRx { rx }, SimControl { state })
    }
}

/// Script faults and inspect traffic of a simulated radio.
#[derive(Clone)]
pub struct SimControl {
    state: Arc<Mutex<SimState>>,
}

impl SimControl {
    /// Apply a fault to the transmission with this 0-based index.
    pub fn set_fault(&self, index: u64, fault: Fault) {
        lock(&self.state).faults.insert(index, fault);
    }

    /// Make the next `n` calls to `send` fail with `Rejected`.
    pub fn fail_next_sends(&self, n: u32) {
        lock(&self.state).fail_next = n;
    }

    /// Calls to `send`, including failed ones.
    pub fn attempts(&self) -> u64 {
        lock(&self.state).attempts
    }

    /// Successful transmissions.
    pub fn transmissions(&self) -> u64 {
        lock(&self.state).transmissions
    }

    /// Every successfully transmitted frame, before faults were applied.
    pub fn transmitted(&self) -> Vec<Bytes> {
        lock(&self.state).log.clone()
    }
}

/// Transmit half of a simulated radio.
pub struct SimTx {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    state: Arc<Mutex<SimState>>,
    mtu: usize,
    min_interval: Duration,
}

impl SimTx {
    fn transmit(&mut self, frame: Bytes) -> Result<(), RadioError> {
        let tx = self.tx.as_ref().ok_or(RadioError::Closed)?;
        let mut state = lock(&self.state);
        state.attempts += 1;

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(RadioError::Rejected("scripted failure".to_string()));
        }
        if frame.len() > self.mtu {
            return Err(RadioError::Rejected(format!(
                "{} bytes exceeds MTU {}",
                frame.len(),
                self.mtu
            )));
        }

        let index = state.transmissions;
        state.transmissions += 1;
        state.log.push(frame.clone());

        let fault = state.faults.remove(&index).unwrap_or(Fault::Deliver);
        let delivered = match fault {
            Fault::Deliver => Some(frame),
            Fault::Drop => None,
            Fault::Corrupt => Some(corrupt(&frame)),
            Fault::Hold(later) => {
                state.held.push((index + later, frame));
                None
            }
        };

        // The receiver may be gone; the frame is simply lost on air.
        if let Some(frame) = delivered {
            let _ = tx.send(frame);
        }

        let mut released = Vec::new();
        state.held.retain(|(release_at, frame)| {
            if *release_at <= index {
                released.push(frame.clone());
                false
            } else {
                true
            }
        });
        for frame in released {
            let _ = tx.send(frame);
        }

        Ok(())
    }
}

fn corrupt(frame: &Bytes) -> Bytes {
    let mut buf = BytesMut::from(&frame[..]);
    if let Some(last) = buf.last_mut() {
        *last = !*last;
    }
    buf.freeze()
}

impl RadioTx for SimTx {
    async fn send(&mut self, frame: Bytes) -> Result<(), RadioError> {
        self.transmit(frame)
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn close(&mut self) -> Result<(), RadioError> {
        if let Some(tx) = self.tx.take() {
            let held = std::mem::take(&mut lock(&self.state).held);
            for (_, frame) in held {
                let _ = tx.send(frame);
            }
        }
        Ok(())
    }
}

/// Receive half of a simulated radio.
pub struct SimRx {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl RadioRx for SimRx {
    async fn recv(&mut self) -> Result<Option<Bytes>, RadioError> {
        Ok(self.rx.recv().await)
    }
}
