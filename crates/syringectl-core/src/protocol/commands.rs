//! Protocol commands
//!
//! Defines the operations understood by the pump firmware and their operands.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ValidationError, MAX_ADDRESS};
use crate::syringe::SyringeSize;
use crate::unit_conversion::{RateValue, VolumeUnit};

/// Address of a pump on the shared bus (0-99)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PumpAddress(u8);

impl PumpAddress {
    /// Address every pump ships with
    pub const DEFAULT: PumpAddress = PumpAddress(0);

    /// Validate an address
    pub fn new(address: u32) -> Result<Self, ValidationError> {
        if address > MAX_ADDRESS as u32 {
            return Err(ValidationError::AddressOutOfRange(address));
        }
        Ok(Self(address as u8))
    }

    /// Numeric value
    pub fn value(self) -> u8 {
        self.0
    }

    /// Every assignable address, in ascending order
    pub fn all() -> impl Iterator<Item = PumpAddress> {
        (0..=MAX_ADDRESS).map(PumpAddress)
    }
}

impl TryFrom<u32> for PumpAddress {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PumpAddress> for u32 {
    fn from(address: PumpAddress) -> Self {
        address.0 as u32
    }
}

impl fmt::Display for PumpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pumping direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Push fluid out of the syringe
    Infuse,
    /// Draw fluid into the syringe
    Withdraw,
    /// Pump answered with neither direction token
    Unknown,
}

impl Direction {
    /// Wire token (`INF` / `WDR`), `None` for [`Direction::Unknown`]
    pub fn token(self) -> Option<&'static str> {
        match self {
            Direction::Infuse => Some("INF"),
            Direction::Withdraw => Some("WDR"),
            Direction::Unknown => None,
        }
    }

    /// The other direction; `Unknown` stays `Unknown`
    pub fn opposite(self) -> Self {
        match self {
            Direction::Infuse => Direction::Withdraw,
            Direction::Withdraw => Direction::Infuse,
            Direction::Unknown => Direction::Unknown,
        }
    }

    /// Classify a reported direction token, ignoring case
    pub fn from_response(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "INF" => Direction::Infuse,
            "WDR" => Direction::Withdraw,
            _ => Direction::Unknown,
        }
    }
}

impl FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inf" | "infuse" => Ok(Direction::Infuse),
            "wdr" | "withdraw" => Ok(Direction::Withdraw),
            _ => Err(ValidationError::UnknownDirection),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Infuse => write!(f, "infuse"),
            Direction::Withdraw => write!(f, "withdraw"),
            Direction::Unknown => write!(f, "unknown"),
        }
    }
}

/// Settings that can be read back with an operand-less command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    /// Pumping rate (`RAT`)
    Rate,
    /// Pumping direction (`DIR`)
    Direction,
    /// Syringe inside diameter (`DIA`)
    Diameter,
    /// Volume to dispense (`VOL`)
    Volume,
    /// Presence check used by discovery (`ADR`)
    Address,
}

impl Parameter {
    /// Command mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Parameter::Rate => "RAT",
            Parameter::Direction => "DIR",
            Parameter::Diameter => "DIA",
            Parameter::Volume => "VOL",
            Parameter::Address => "ADR",
        }
    }
}

/// Operand of a `VOL` set command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeSetting {
    /// Volume to dispense before stopping, in the pump's current volume unit
    Value(f64),
    /// Change the volume unit
    Unit(VolumeUnit),
}

/// Protocol commands, each carrying its operands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Read back a setting
    Query(Parameter),

    /// Set the pumping rate
    SetRate(RateValue),

    /// Set the pumping direction
    SetDirection(Direction),

    /// Set the syringe inside diameter
    SetDiameter(SyringeSize),

    /// Set the volume to dispense or its unit
    SetVolume(VolumeSetting),

    /// Start pumping
    Run,

    /// Stop (or pause) pumping
    Stop,

    /// Reassign the address of the only pump on the bus
    SetAddress {
        /// New address
        address: PumpAddress,
        /// Optional baud rate to store with the address
        baud_rate: Option<u32>,
    },

    /// Clear the dispensed accumulator of one direction
    ClearDispensed(Direction),

    /// Read both dispensed accumulators
    QueryDispensed,
}

impl Command {
    /// Command mnemonic
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Command::Query(param) => param.mnemonic(),
            Command::SetRate(_) => "RAT",
            Command::SetDirection(_) => "DIR",
            Command::SetDiameter(_) => "DIA",
            Command::SetVolume(_) => "VOL",
            Command::Run => "RUN",
            Command::Stop => "STP",
            Command::SetAddress { .. } => "ADR",
            Command::ClearDispensed(_) => "CLD",
            Command::QueryDispensed => "DIS",
        }
    }

    /// Whether the command is sent without a pump address prefix
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Command::SetAddress { .. })
    }
}
