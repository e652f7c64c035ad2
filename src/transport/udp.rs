//! UDP datagram bridge to a LoRa gateway or packet forwarder.
//!
//! One datagram carries exactly one frame. The MTU and minimum interval are
//! configured here because the gateway, not the socket, enforces them.
//!
//! # Example
//!
//! ```ignore
//! use lora_telemetry::transport::UdpRadio;
//!
//! let radio = UdpRadio::bind("0.0.0.0:1700").await?.with_mtu(255);
//! let tx = radio.sender("192.168.1.20:1700".parse()?);
//! let rx = radio.receiver();
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{ToSocketAddrs, UdpSocket};

use super::{RadioError, RadioRx, RadioTx};
use crate::protocol::DEFAULT_MTU;

/// Largest datagram accepted on receive. Oversized frames are left to the
/// frame codec to reject.
const RECV_BUFFER_SIZE: usize = 2048;

/// A bound UDP socket shared by its transmit and receive halves.
pub struct UdpRadio {
    socket: Arc<UdpSocket>,
    mtu: usize,
    min_interval: Duration,
}

impl UdpRadio {
    /// Bind a UDP socket.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, RadioError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            mtu: DEFAULT_MTU,
            min_interval: Duration::ZERO,
        })
    }

    /// Set the MTU (header included).
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the minimum interval between transmissions.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr, RadioError> {
        Ok(self.socket.local_addr()?)
    }

    /// Transmit half sending to `peer`.
    pub fn sender(&self, peer: SocketAddr) -> UdpTx {
        UdpTx {
            socket: self.socket.clone(),
            peer,
            mtu: self.mtu,
            min_interval: self.min_interval,
        }
    }

    /// Receive half accepting datagrams from any source.
    pub fn receiver(&self) -> UdpRx {
        UdpRx {
            socket: self.socket.clone(),
            buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }
}

/// Transmit half of a [`UdpRadio`].
pub struct UdpTx {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    mtu: usize,
    min_interval: Duration,
}

impl RadioTx for UdpTx {
    async fn send(&mut self, frame: Bytes) -> Result<(), RadioError> {
        if frame.len() > self.mtu {
            return Err(RadioError::Rejected(format!(
                "{} bytes exceeds MTU {}",
                frame.len(),
                self.mtu
            )));
        }

        let written = self.socket.send_to(&frame, self.peer).await?;
        if written != frame.len() {
            return Err(RadioError::Rejected(format!(
                "short datagram: {} of {} bytes",
                written,
                frame.len()
            )));
        }
        Ok(())
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Receive half of a [`UdpRadio`].
///
/// UDP has no end of stream: `recv` never returns `Ok(None)`.
pub struct UdpRx {
    socket: Arc<UdpSocket>,
    buf: Vec<u8>,
}

impl RadioRx for UdpRx {
    async fn recv(&mut self) -> Result<Option<Bytes>, RadioError> {
        let (len, from) = self.socket.recv_from(&mut self.buf).await?;
        tracing::trace!(%from, len, "datagram received");
        Ok(Some(Bytes::copy_from_slice(&self.buf[..len])))
    }
}
