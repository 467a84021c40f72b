//! Transport
//!
//! One exchange is one write, a fixed settle interval, and a read of every
//! byte the pump has produced by then.

use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::serial::{clear_buffers, configure_port, open_port, read_available};
use super::{ConnectionError, TransportError};

/// Byte-level link to the pump bus
pub trait Transport {
    /// Write `frame`, wait for the device, and return whatever it answered
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(frame)
    }
}

/// Serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    port_name: String,
    settle: Duration,
    tx_bytes: u64,
    rx_bytes: u64,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_name", &self.port_name)
            .field("settle", &self.settle)
            .finish()
    }
}

impl SerialTransport {
    /// Open the first candidate port that accepts the connection
    ///
    /// After opening, any pending bytes are drained: a pump in alarm state
    /// emits an alarm frame which must be cleared before the first command.
    pub fn open<S: AsRef<str>>(
        candidates: &[S],
        baud_rate: u32,
        settle: Duration,
    ) -> Result<Self, ConnectionError> {
        let mut tried = Vec::new();
        for candidate in candidates {
            let name = candidate.as_ref();
            tried.push(name.to_string());
            info!("Trying to reach the pump on {}...", name);
            match Self::open_one(name, baud_rate) {
                Ok(port) => {
                    info!("Connected to pump bus on {} at {} baud", name, baud_rate);
                    return Ok(Self {
                        port,
                        port_name: name.to_string(),
                        settle,
                        tx_bytes: 0,
                        rx_bytes: 0,
                    });
                }
                Err(e) => warn!("Could not use {}: {}", name, e),
            }
        }
        Err(ConnectionError::NoDeviceFound { tried })
    }

    fn open_one(name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, TransportError> {
        let mut port = open_port(name, Some(baud_rate))?;
        configure_port(port.as_mut())?;
        let latent = read_available(port.as_mut())?;
        if !latent.is_empty() {
            debug!(
                "open: drained {} latent bytes on {}: {:?}",
                latent.len(),
                name,
                String::from_utf8_lossy(&latent)
            );
        }
        Ok(port)
    }

    /// Name of the open port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Settle interval between write and read
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Cumulative bytes written and read
    pub fn counters(&self) -> (u64, u64) {
        (self.tx_bytes, self.rx_bytes)
    }

    /// Discard anything buffered in either direction
    pub fn clear(&mut self) -> Result<(), TransportError> {
        clear_buffers(self.port.as_mut())
    }
}

impl Transport for SerialTransport {
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        debug!(
            "exchange: sending {} bytes: {:?}",
            frame.len(),
            String::from_utf8_lossy(frame)
        );
        self.port.write_all(frame)?;
        self.port.flush()?;
        self.tx_bytes = self.tx_bytes.saturating_add(frame.len() as u64);

        std::thread::sleep(self.settle);

        let response = read_available(self.port.as_mut())?;
        self.rx_bytes = self.rx_bytes.saturating_add(response.len() as u64);
        Ok(response)
    }
}
