//! Demo Mode - Simulated syringe pump for testing
//!
//! Answers the command grammar the way a single pump on the bus would, so the
//! session and the command line tool can be exercised without hardware.
//! State rules follow the firmware: rate, direction and diameter changes are
//! refused while pumping, and stopping a stopped pump is "not applicable".

use crate::protocol::{
    Direction, PumpAddress, PumpStatus, Transport, TransportError, BATCH_SEPARATOR, CR, ETX, STX,
};
use crate::syringe::SyringeSize;
use crate::unit_conversion::{format_magnitude, RateUnit, RateValue, VolumeUnit};

/// Simulated pump answering on one address
#[derive(Debug, Clone)]
pub struct SimulatedPump {
    address: PumpAddress,
    status: PumpStatus,
    direction_infuse: bool,
    rate: RateValue,
    bore: String,
    volume: f64,
    volume_unit: VolumeUnit,
    /// Dispensed totals in mL
    infused_ml: f64,
    withdrawn_ml: f64,
    pending_alarm: Option<char>,
    received: Vec<String>,
}

impl Default for SimulatedPump {
    fn default() -> Self {
        Self::new(PumpAddress::DEFAULT)
    }
}

impl SimulatedPump {
    /// A stopped pump with factory settings
    pub fn new(address: PumpAddress) -> Self {
        Self {
            address,
            status: PumpStatus::Stopped,
            direction_infuse: true,
            rate: RateValue::milliliters_per_hour(10.0),
            bore: SyringeSize::Ml5.bore().to_string(),
            volume: 0.0,
            volume_unit: VolumeUnit::Milliliters,
            infused_ml: 0.0,
            withdrawn_ml: 0.0,
            pending_alarm: None,
            received: Vec::new(),
        }
    }

    /// Address the pump currently answers on
    pub fn address(&self) -> PumpAddress {
        self.address
    }

    /// Current state
    pub fn status(&self) -> PumpStatus {
        self.status
    }

    /// Every command received, without terminator
    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Report an alarm on the next command (`R`, `S`, `T`, `E` or `O`)
    pub fn raise_alarm(&mut self, cause: char) {
        self.pending_alarm = Some(cause);
    }

    /// Add to a dispensed total, as if the plunger had moved
    pub fn dispense(&mut self, direction: Direction, ml: f64) {
        match direction {
            Direction::Infuse => self.infused_ml += ml,
            Direction::Withdraw => self.withdrawn_ml += ml,
            Direction::Unknown => {}
        }
    }

    fn frame(&self, body: String) -> Vec<u8> {
        let mut out = vec![STX];
        out.extend_from_slice(format!("{:02}", self.address.value()).as_bytes());
        out.extend_from_slice(body.as_bytes());
        out.push(ETX);
        out
    }

    fn ok(&self, data: &str) -> Vec<u8> {
        self.frame(format!("{}{}", self.status.as_char(), data))
    }

    fn err(&self, code: &str) -> Vec<u8> {
        self.frame(format!("{}?{}", self.status.as_char(), code))
    }

    fn running(&self) -> bool {
        self.status.is_running()
    }

    fn to_volume_unit(&self, ml: f64) -> f64 {
        match self.volume_unit {
            VolumeUnit::Milliliters => ml,
            VolumeUnit::Microliters => ml * 1000.0,
        }
    }

    /// Digits other than leading zeros
    fn significant_digits(operand: &str) -> usize {
        operand
            .chars()
            .filter(|c| c.is_ascii_digit())
            .skip_while(|c| *c == '0')
            .count()
    }

    fn handle_rate(&mut self, operand: &str) -> Vec<u8> {
        if operand.is_empty() {
            let data = format!(
                "{}{}",
                format_magnitude(self.rate.magnitude, 3),
                self.rate.unit.token()
            );
            return self.ok(&data);
        }
        if self.running() {
            return self.err("NA");
        }
        let split = operand
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(operand.len());
        let (number, unit) = operand.split_at(split);
        let unit = if unit.is_empty() {
            self.rate.unit
        } else {
            match RateUnit::from_token(unit) {
                Some(unit) => unit,
                None => return self.err(""),
            }
        };
        let magnitude: f64 = match number.parse() {
            Ok(m) => m,
            Err(_) => return self.err(""),
        };
        if Self::significant_digits(number) > 4 || magnitude > 9999.0 {
            return self.err("OOR");
        }
        self.rate = RateValue { magnitude, unit };
        self.ok("")
    }

    fn handle_direction(&mut self, operand: &str) -> Vec<u8> {
        match operand {
            "" => {
                let token = if self.direction_infuse { "INF" } else { "WDR" };
                self.ok(token)
            }
            "INF" | "WDR" if self.running() => self.err("NA"),
            "INF" => {
                self.direction_infuse = true;
                self.ok("")
            }
            "WDR" => {
                self.direction_infuse = false;
                self.ok("")
            }
            _ => self.err(""),
        }
    }

    fn handle_diameter(&mut self, operand: &str) -> Vec<u8> {
        if operand.is_empty() {
            return self.ok(&self.bore);
        }
        if self.running() {
            return self.err("NA");
        }
        match operand.parse::<f64>() {
            Ok(mm) if (0.1..=50.0).contains(&mm) => {
                self.bore = operand.to_string();
                self.ok("")
            }
            Ok(_) => self.err("OOR"),
            Err(_) => self.err(""),
        }
    }

    fn handle_volume(&mut self, operand: &str) -> Vec<u8> {
        if operand.is_empty() {
            let data = format!(
                "{}{}",
                format_magnitude(self.volume, 3),
                self.volume_unit.token()
            );
            return self.ok(&data);
        }
        if let Some(unit) = VolumeUnit::from_token(operand) {
            self.volume_unit = unit;
            return self.ok("");
        }
        match operand.parse::<f64>() {
            Ok(v) if Self::significant_digits(operand) <= 4 => {
                self.volume = v;
                self.ok("")
            }
            Ok(_) => self.err("OOR"),
            Err(_) => self.err(""),
        }
    }

    fn handle_dispensed(&mut self) -> Vec<u8> {
        let data = format!(
            "I{:.3}W{:.3}{}",
            self.to_volume_unit(self.infused_ml),
            self.to_volume_unit(self.withdrawn_ml),
            self.volume_unit.token()
        );
        self.ok(&data)
    }

    fn handle_clear(&mut self, operand: &str) -> Vec<u8> {
        match operand {
            "INF" => self.infused_ml = 0.0,
            "WDR" => self.withdrawn_ml = 0.0,
            _ => return self.err(""),
        }
        self.ok("")
    }

    fn handle_run(&mut self) -> Vec<u8> {
        self.status = if self.direction_infuse {
            PumpStatus::Infusing
        } else {
            PumpStatus::Withdrawing
        };
        self.ok("")
    }

    fn handle_stop(&mut self) -> Vec<u8> {
        match self.status {
            PumpStatus::Stopped => self.err("NA"),
            PumpStatus::Paused => {
                self.status = PumpStatus::Stopped;
                self.ok("")
            }
            _ => {
                self.status = PumpStatus::Paused;
                self.ok("")
            }
        }
    }

    fn handle_address(&mut self, operand: &str) -> Vec<u8> {
        if operand.is_empty() {
            return self.ok("");
        }
        let number = operand.split('B').next().unwrap_or_default();
        match number.parse::<u32>().ok().and_then(|n| PumpAddress::new(n).ok()) {
            Some(address) => {
                self.address = address;
                self.ok("")
            }
            None => self.err("OOR"),
        }
    }

    /// Reply to one command; `None` when it is addressed to another pump
    fn handle(&mut self, address: Option<u32>, body: &str) -> Option<Vec<u8>> {
        if let Some(address) = address {
            if address != self.address.value() as u32 {
                return None;
            }
        }
        if let Some(cause) = self.pending_alarm.take() {
            return Some(self.frame(format!("A?{}", cause)));
        }

        if !body.is_ascii() {
            return Some(self.err(""));
        }
        let body = body.to_ascii_uppercase();
        let (mnemonic, operand) = body.split_at(body.len().min(3));
        let reply = match mnemonic {
            "RAT" => self.handle_rate(operand),
            "DIR" => self.handle_direction(operand),
            "DIA" => self.handle_diameter(operand),
            "VOL" => self.handle_volume(operand),
            "DIS" if operand.is_empty() => self.handle_dispensed(),
            "CLD" => self.handle_clear(operand),
            "RUN" if operand.is_empty() => self.handle_run(),
            "STP" if operand.is_empty() => self.handle_stop(),
            "ADR" => self.handle_address(operand),
            _ => self.err(""),
        };
        Some(reply)
    }
}

impl Transport for SimulatedPump {
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let line = String::from_utf8_lossy(frame);
        let line = line.trim_end_matches(CR as char);
        self.received.push(line.to_string());

        let mut out = Vec::new();
        let mut broadcast = false;
        for piece in line.split(BATCH_SEPARATOR) {
            if piece.is_empty() {
                broadcast = true;
                continue;
            }
            let reply = if broadcast {
                self.handle(None, piece)
            } else {
                let digits = piece.chars().take_while(|c| c.is_ascii_digit()).count();
                match piece[..digits].parse::<u32>() {
                    Ok(address) => self.handle(Some(address), &piece[digits..]),
                    Err(_) => None,
                }
            };
            broadcast = false;
            if let Some(reply) = reply {
                out.extend(reply);
            }
        }
        Ok(out)
    }
}
