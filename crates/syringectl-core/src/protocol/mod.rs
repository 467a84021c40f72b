//! Pump Serial Protocol
//!
//! Implements the address-prefixed ASCII protocol spoken by New Era style
//! syringe pump controllers.
//!
//! Commands are `<addr><MNEMONIC>[operand]\r`. Responses are framed as
//! `STX <2-digit addr> <status> [data] ETX`.

pub mod command_builder;
pub mod commands;
mod error;
pub mod response;
pub mod serial;
mod transport;

pub use command_builder::{encode, encode_batch, encode_broadcast};
pub use commands::{Command, Direction, Parameter, PumpAddress, VolumeSetting};
pub use error::{AlarmCause, ConnectionError, ResponseError, TransportError, ValidationError};
pub use response::{parse, parse_frames, Payload, ProtocolResponse, PumpStatus};
pub use serial::{clear_buffers, configure_port, default_candidate_ports, list_ports, open_port, PortInfo};
pub use transport::{SerialTransport, Transport};

/// Default baud rate of the pump bus
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default wait between writing a command and reading the reply, in milliseconds
pub const DEFAULT_SETTLE_MS: u64 = 250;

/// Start-of-text byte opening every response frame
pub const STX: u8 = 0x02;

/// End-of-text byte closing every response frame
pub const ETX: u8 = 0x03;

/// Command terminator
pub const CR: u8 = b'\r';

/// Separator between commands in a batched frame, also the broadcast prefix
pub const BATCH_SEPARATOR: char = '*';

/// Highest address a pump can be assigned
pub const MAX_ADDRESS: u8 = 99;
