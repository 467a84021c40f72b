//! Pump session
//!
//! One method per pump capability. Every call is a complete exchange with the
//! device; nothing about the pump's state is cached between calls, so the
//! answers always reflect the hardware (front panel use, power cycles).

use thiserror::Error;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::protocol::{
    encode, encode_batch, encode_broadcast, parse, parse_frames, Command, ConnectionError,
    Direction, Parameter, Payload, ProtocolResponse, PumpAddress, PumpStatus, ResponseError,
    SerialTransport, Transport, TransportError, ValidationError, VolumeSetting, CR,
};
use crate::syringe::{DiameterReading, SyringeSize};
use crate::unit_conversion::{DispensedVolume, RateValue, VolumeReading, VolumeUnit};

/// Rate used by [`PumpSession::prime`], in mL/h
pub const PRIME_RATE_MH: f64 = 10.0;

/// Errors returned by session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("Direction change not confirmed: expected {expected}, pump reports {actual}")]
    DirectionNotConfirmed {
        expected: Direction,
        actual: Direction,
    },
}

impl SessionError {
    /// The classified pump reply, if that is what failed
    pub fn response_error(&self) -> Option<ResponseError> {
        match self {
            SessionError::Response(e) => Some(*e),
            _ => None,
        }
    }
}

/// Session with the pumps on one serial bus
pub struct PumpSession<T: Transport = SerialTransport> {
    transport: T,
}

impl PumpSession<SerialTransport> {
    /// Open the first candidate port from `config`
    pub fn connect(config: &SessionConfig) -> Result<Self, ConnectionError> {
        let ports = config.resolved_ports();
        let transport = SerialTransport::open(&ports, config.baud_rate, config.settle())?;
        Ok(Self::new(transport))
    }
}

impl<T: Transport> PumpSession<T> {
    /// Wrap an open transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Close the session, returning the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send(&mut self, line: &str) -> Result<Vec<u8>, SessionError> {
        Ok(self.transport.exchange(line.as_bytes())?)
    }

    fn execute(&mut self, address: PumpAddress, command: Command) -> Result<Payload, SessionError> {
        let line = encode(address, &command)?;
        let raw = self.send(&line)?;
        let response = parse(&raw);
        debug!("{:?} -> {:?}", line.trim_end(), response);
        Ok(response.into_result()?)
    }

    fn execute_frames(&mut self, line: &str) -> Result<Vec<ProtocolResponse>, SessionError> {
        let raw = self.send(line)?;
        let frames = parse_frames(&raw);
        debug!("{:?} -> {:?}", line.trim_end(), frames);
        Ok(frames)
    }

    /// Send a hand-written command line; a missing CR is appended
    pub fn exchange_raw(&mut self, line: &str) -> Result<Vec<ProtocolResponse>, SessionError> {
        let mut line = line.trim_end().to_string();
        line.push(CR as char);
        self.execute_frames(&line)
    }

    /// Current rate in µL/h
    pub fn query_rate(&mut self, address: PumpAddress) -> Result<RateValue, SessionError> {
        Ok(self.query_rate_native(address)?.normalized())
    }

    /// Current rate in the unit the pump reports
    pub fn query_rate_native(&mut self, address: PumpAddress) -> Result<RateValue, SessionError> {
        let payload = self.execute(address, Command::Query(Parameter::Rate))?;
        Ok(payload.rate()?)
    }

    /// Set the rate; ≥ 5000 µL/h is sent in mL/h
    pub fn set_rate(
        &mut self,
        address: PumpAddress,
        rate: RateValue,
    ) -> Result<PumpStatus, SessionError> {
        Ok(self.execute(address, Command::SetRate(rate))?.status)
    }

    /// Current direction
    pub fn query_direction(&mut self, address: PumpAddress) -> Result<Direction, SessionError> {
        let payload = self.execute(address, Command::Query(Parameter::Direction))?;
        Ok(payload.direction())
    }

    /// Set the direction
    pub fn set_direction(
        &mut self,
        address: PumpAddress,
        direction: Direction,
    ) -> Result<PumpStatus, SessionError> {
        Ok(self.execute(address, Command::SetDirection(direction))?.status)
    }

    /// Stop the pump, flip its direction, and return the direction it confirms
    ///
    /// The pump only accepts a direction change while stopped, so a stop is
    /// issued first; a "not applicable" reply means it was already stopped.
    pub fn reverse_direction(&mut self, address: PumpAddress) -> Result<Direction, SessionError> {
        self.stop_tolerant(address)?;

        let current = self.query_direction(address)?;
        let target = match current {
            Direction::Unknown => return Err(ResponseError::Unparseable.into()),
            known => known.opposite(),
        };
        self.set_direction(address, target)?;

        let confirmed = self.query_direction(address)?;
        if confirmed != target {
            return Err(SessionError::DirectionNotConfirmed {
                expected: target,
                actual: confirmed,
            });
        }
        info!("Pump {} reversed from {} to {}", address, current, confirmed);
        Ok(confirmed)
    }

    /// Current syringe diameter
    pub fn query_diameter(&mut self, address: PumpAddress) -> Result<DiameterReading, SessionError> {
        let payload = self.execute(address, Command::Query(Parameter::Diameter))?;
        Ok(payload.diameter()?)
    }

    /// Set the syringe diameter
    pub fn set_diameter(
        &mut self,
        address: PumpAddress,
        size: SyringeSize,
    ) -> Result<PumpStatus, SessionError> {
        Ok(self.execute(address, Command::SetDiameter(size))?.status)
    }

    /// Set the syringe diameter from a label such as `5ml`
    pub fn set_diameter_label(
        &mut self,
        address: PumpAddress,
        label: &str,
    ) -> Result<PumpStatus, SessionError> {
        let size = SyringeSize::from_label(label)?;
        self.set_diameter(address, size)
    }

    /// Volume to dispense before the pump stops by itself
    pub fn query_volume(&mut self, address: PumpAddress) -> Result<VolumeReading, SessionError> {
        let payload = self.execute(address, Command::Query(Parameter::Volume))?;
        Ok(payload.volume()?)
    }

    /// Set the volume to dispense, in the pump's current volume unit
    pub fn set_volume(&mut self, address: PumpAddress, value: f64) -> Result<PumpStatus, SessionError> {
        Ok(self
            .execute(address, Command::SetVolume(VolumeSetting::Value(value)))?
            .status)
    }

    /// Set the unit used for dispense volumes
    pub fn set_volume_unit(
        &mut self,
        address: PumpAddress,
        unit: VolumeUnit,
    ) -> Result<PumpStatus, SessionError> {
        Ok(self
            .execute(address, Command::SetVolume(VolumeSetting::Unit(unit)))?
            .status)
    }

    /// Start pumping
    pub fn run(&mut self, address: PumpAddress) -> Result<PumpStatus, SessionError> {
        Ok(self.execute(address, Command::Run)?.status)
    }

    /// Stop pumping
    ///
    /// A running pump pauses (`P`); a paused one stops (`S`); a stopped one
    /// answers [`ResponseError::NotApplicable`].
    pub fn stop(&mut self, address: PumpAddress) -> Result<PumpStatus, SessionError> {
        Ok(self.execute(address, Command::Stop)?.status)
    }

    fn stop_tolerant(&mut self, address: PumpAddress) -> Result<(), SessionError> {
        match self.stop(address) {
            Ok(_) | Err(SessionError::Response(ResponseError::NotApplicable)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Reassign the address of the only pump on the bus
    pub fn set_address(
        &mut self,
        new_address: PumpAddress,
        baud_rate: Option<u32>,
    ) -> Result<PumpStatus, SessionError> {
        let command = Command::SetAddress {
            address: new_address,
            baud_rate,
        };
        let status = self.execute(new_address, command)?.status;
        info!("Pump address set to {}", new_address);
        Ok(status)
    }

    /// Clear the dispensed total of one direction
    pub fn clear_dispensed(
        &mut self,
        address: PumpAddress,
        direction: Direction,
    ) -> Result<PumpStatus, SessionError> {
        Ok(self.execute(address, Command::ClearDispensed(direction))?.status)
    }

    /// Volumes dispensed in each direction since last cleared
    pub fn query_dispensed(&mut self, address: PumpAddress) -> Result<DispensedVolume, SessionError> {
        let payload = self.execute(address, Command::QueryDispensed)?;
        Ok(payload.dispensed()?)
    }

    /// Ask each address in turn whether a pump answers
    pub fn discover<I>(&mut self, addresses: I) -> Result<Vec<PumpAddress>, SessionError>
    where
        I: IntoIterator<Item = PumpAddress>,
    {
        let mut found = Vec::new();
        for address in addresses {
            let line = encode(address, &Command::Query(Parameter::Address))?;
            if !self.send(&line)?.is_empty() {
                debug!("discover: pump answered at {}", address);
                found.push(address);
            }
        }
        info!("discover: {} pump(s) answered: {:?}", found.len(), found);
        Ok(found)
    }

    /// Set several pumps' rates in one frame
    pub fn set_rates_batched(
        &mut self,
        rates: &[(PumpAddress, RateValue)],
    ) -> Result<Vec<ProtocolResponse>, SessionError> {
        let commands: Vec<(PumpAddress, Command)> = rates
            .iter()
            .map(|(address, rate)| (*address, Command::SetRate(*rate)))
            .collect();
        let line = encode_batch(&commands)?;
        self.execute_frames(&line)
    }

    /// Start every pump on the bus
    pub fn run_all(&mut self) -> Result<Vec<ProtocolResponse>, SessionError> {
        let line = encode_broadcast(&Command::Run)?;
        self.execute_frames(&line)
    }

    /// Stop every pump on the bus
    pub fn stop_all(&mut self) -> Result<Vec<ProtocolResponse>, SessionError> {
        let line = encode_broadcast(&Command::Stop)?;
        self.execute_frames(&line)
    }

    /// Fill the line: set the rate to 10 mL/h and start
    pub fn prime(&mut self, address: PumpAddress) -> Result<PumpStatus, SessionError> {
        self.set_rate(address, RateValue::milliliters_per_hour(PRIME_RATE_MH))?;
        self.run(address)
    }

    /// Stop the pump and zero its rate so a stray run does nothing
    pub fn halt(&mut self, address: PumpAddress) -> Result<PumpStatus, SessionError> {
        self.stop_tolerant(address)?;
        self.set_rate(address, RateValue::microliters_per_hour(0.0))
    }
}
