//! Session configuration
//!
//! Stored as JSON, e.g.:
//!
//! ```json
//! {
//!   "candidate_ports": ["/dev/ttyUSB0", "COM3"],
//!   "baud_rate": 19200,
//!   "settle_ms": 250,
//!   "default_address": 0
//! }
//! ```
//!
//! Missing fields take their defaults; an empty `candidate_ports` list means
//! probing [`default_candidate_ports`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{default_candidate_ports, PumpAddress, DEFAULT_BAUD_RATE, DEFAULT_SETTLE_MS};

/// Errors loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for opening a [`PumpSession`](crate::session::PumpSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Ports to try, in order
    pub candidate_ports: Vec<String>,
    /// Bus baud rate
    pub baud_rate: u32,
    /// Wait between writing a command and reading the reply
    pub settle_ms: u64,
    /// Pump addressed when the caller does not name one
    pub default_address: PumpAddress,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            candidate_ports: Vec::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            settle_ms: DEFAULT_SETTLE_MS,
            default_address: PumpAddress::DEFAULT,
        }
    }
}

impl SessionConfig {
    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Settle interval as a [`Duration`]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Configured ports, or the platform defaults when none are configured
    pub fn resolved_ports(&self) -> Vec<String> {
        if self.candidate_ports.is_empty() {
            default_candidate_ports()
        } else {
            self.candidate_ports.clone()
        }
    }
}
