//! # syringectl Core Library
//!
//! Protocol engine for programmable syringe pumps driven over a shared serial bus.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial port discovery and a settle-then-read transport
//! - Encoding of the address-prefixed ASCII command grammar
//! - Framing, classification and field extraction of pump responses
//! - Rate/volume unit handling and the syringe bore table
//! - A [`PumpSession`](session::PumpSession) façade with one call per capability
//!
//! ## Example
//!
//! ```rust,ignore
//! use syringectl_core::prelude::*;
//!
//! let config = SessionConfig::default();
//! let mut session = PumpSession::connect(&config)?;
//!
//! let pump = PumpAddress::new(0)?;
//! session.set_diameter(pump, SyringeSize::Ml5)?;
//! session.set_rate(pump, RateValue::microliters_per_hour(7500.0))?;
//! println!("rate: {}", session.query_rate(pump)?);
//! ```

pub mod config;
pub mod demo;
pub mod protocol;
pub mod session;
pub mod syringe;
pub mod unit_conversion;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::demo::SimulatedPump;
    pub use crate::protocol::{
        Command, ConnectionError, Direction, Parameter, PumpAddress, PumpStatus, ResponseError,
        SerialTransport, Transport, ValidationError, VolumeSetting,
    };
    pub use crate::session::{PumpSession, SessionError};
    pub use crate::syringe::{DiameterReading, SyringeSize};
    pub use crate::unit_conversion::{DispensedVolume, RateUnit, RateValue, VolumeReading, VolumeUnit};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
