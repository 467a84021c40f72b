//! Protocol errors

use thiserror::Error;

/// Errors raised while opening the serial link
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("No pump found on any candidate port (tried: {})", tried.join(", "))]
    NoDeviceFound { tried: Vec<String> },
}

/// I/O failures during a single exchange
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serialport::Error> for TransportError {
    fn from(e: serialport::Error) -> Self {
        TransportError::Serial(e.to_string())
    }
}

/// Operands rejected before anything is written to the bus
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown syringe size '{0}' (available: 1ml, 3ml, 5ml, 10ml, 20ml, 60ml)")]
    UnknownSyringeSize(String),

    #[error("Unknown rate unit in '{0}' (expected uh or mh)")]
    UnknownRateUnit(String),

    #[error("Unknown volume unit '{0}' (expected ul or ml)")]
    UnknownVolumeUnit(String),

    #[error("Direction must be infuse or withdraw")]
    UnknownDirection,

    #[error("Invalid magnitude {0}: must be finite and non-negative")]
    InvalidMagnitude(f64),

    #[error("Pump address {0} out of range (0-99)")]
    AddressOutOfRange(u32),
}

/// Alarm reported by the pump in place of a status letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmCause {
    /// Power was interrupted
    Reset,
    /// Motor stalled
    Stall,
    /// Communications watchdog expired
    CommTimeout,
    /// Pumping program error
    ProgramError,
    /// Program phase out of range
    PhaseOutOfRange,
    /// Cause letter not recognised
    Other(char),
}

impl AlarmCause {
    /// Map the letter following `A?` to an alarm cause
    pub fn from_code(code: &str) -> Self {
        match code.chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('R') => AlarmCause::Reset,
            Some('S') => AlarmCause::Stall,
            Some('T') => AlarmCause::CommTimeout,
            Some('E') => AlarmCause::ProgramError,
            Some('O') => AlarmCause::PhaseOutOfRange,
            Some(c) => AlarmCause::Other(c),
            None => AlarmCause::Other('?'),
        }
    }
}

/// Classified failure carried by a pump response
///
/// These are ordinary results of an exchange, not faults of the engine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    #[error("Command not understood by pump")]
    NotUnderstood,

    #[error("Command not applicable in the pump's current state")]
    NotApplicable,

    #[error("Operand out of range")]
    OutOfRange,

    #[error("Pump alarm: {0:?}")]
    Alarm(AlarmCause),

    #[error("Pump response not interpretable")]
    Unparseable,
}
