//! Command Builder
//!
//! Renders [`Command`]s into the pump's ASCII grammar.
//!
//! Grammar:
//! - `<addr><MNEMONIC>\r` : query or control (`0RAT`, `3RUN`)
//! - `<addr><MNEMONIC><operand>\r` : set, operand appended without separator (`0RAT7.5MH`)
//! - `*ADR<addr>[B<baud>]\r` : address reassignment, no pump prefix
//! - `<cmd>*<cmd>*...\r` : batched frame addressing several pumps

use super::{Command, PumpAddress, ValidationError, VolumeSetting, BATCH_SEPARATOR, CR};
use crate::unit_conversion::volume_operand;

/// Command body without terminator
fn render(address: Option<PumpAddress>, command: &Command) -> Result<String, ValidationError> {
    let operand = match command {
        Command::Query(_) | Command::Run | Command::Stop | Command::QueryDispensed => String::new(),
        Command::SetRate(rate) => rate.wire_operand()?,
        Command::SetDirection(direction) | Command::ClearDispensed(direction) => direction
            .token()
            .ok_or(ValidationError::UnknownDirection)?
            .to_string(),
        Command::SetDiameter(size) => size.bore().to_string(),
        Command::SetVolume(VolumeSetting::Value(value)) => volume_operand(*value)?,
        Command::SetVolume(VolumeSetting::Unit(unit)) => unit.token().to_string(),
        Command::SetAddress { address, baud_rate } => match baud_rate {
            Some(baud) => format!("{}B{}", address, baud),
            None => address.to_string(),
        },
    };

    let prefix = match (command.is_broadcast(), address) {
        (true, _) | (false, None) => BATCH_SEPARATOR.to_string(),
        (false, Some(address)) => address.to_string(),
    };

    Ok(format!("{}{}{}", prefix, command.mnemonic(), operand))
}

/// Encode one command for one pump, terminated by CR
///
/// Address reassignment ignores `address` and is always sent as `*ADR`.
pub fn encode(address: PumpAddress, command: &Command) -> Result<String, ValidationError> {
    let mut line = render(Some(address), command)?;
    line.push(CR as char);
    Ok(line)
}

/// Encode a command for every pump on the bus (`*RUN`, `*STP`, ...)
pub fn encode_broadcast(command: &Command) -> Result<String, ValidationError> {
    let mut line = render(None, command)?;
    line.push(CR as char);
    Ok(line)
}

/// Join several addressed commands into one `*`-separated frame with a single CR
pub fn encode_batch(commands: &[(PumpAddress, Command)]) -> Result<String, ValidationError> {
    let parts = commands
        .iter()
        .map(|(address, command)| render(Some(*address), command))
        .collect::<Result<Vec<_>, _>>()?;
    let mut line = parts.join(&BATCH_SEPARATOR.to_string());
    line.push(CR as char);
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Direction, Parameter};
    use crate::syringe::SyringeSize;
    use crate::unit_conversion::{RateValue, VolumeUnit};

    fn addr(n: u32) -> PumpAddress {
        PumpAddress::new(n).unwrap()
    }

    #[test]
    fn test_queries() {
        assert_eq!(encode(addr(0), &Command::Query(Parameter::Rate)).unwrap(), "0RAT\r");
        assert_eq!(encode(addr(1), &Command::Query(Parameter::Direction)).unwrap(), "1DIR\r");
        assert_eq!(encode(addr(12), &Command::Query(Parameter::Diameter)).unwrap(), "12DIA\r");
        assert_eq!(encode(addr(0), &Command::Query(Parameter::Volume)).unwrap(), "0VOL\r");
        assert_eq!(encode(addr(0), &Command::QueryDispensed).unwrap(), "0DIS\r");
        assert_eq!(encode(addr(7), &Command::Query(Parameter::Address)).unwrap(), "7ADR\r");
    }

    #[test]
    fn test_sets() {
        assert_eq!(
            encode(addr(0), &Command::SetRate(RateValue::microliters_per_hour(7500.0))).unwrap(),
            "0RAT7.5MH\r"
        );
        assert_eq!(
            encode(addr(0), &Command::SetRate(RateValue::microliters_per_hour(100.0))).unwrap(),
            "0RAT100UH\r"
        );
        assert_eq!(
            encode(addr(2), &Command::SetDirection(Direction::Infuse)).unwrap(),
            "2DIRINF\r"
        );
        assert_eq!(
            encode(addr(2), &Command::SetDirection(Direction::Withdraw)).unwrap(),
            "2DIRWDR\r"
        );
        assert_eq!(
            encode(addr(0), &Command::SetDiameter(SyringeSize::Ml5)).unwrap(),
            "0DIA11.99\r"
        );
        assert_eq!(
            encode(addr(0), &Command::SetVolume(VolumeSetting::Value(3.14))).unwrap(),
            "0VOL3.14\r"
        );
        assert_eq!(
            encode(addr(0), &Command::SetVolume(VolumeSetting::Unit(VolumeUnit::Microliters)))
                .unwrap(),
            "0VOLUL\r"
        );
        assert_eq!(
            encode(addr(4), &Command::ClearDispensed(Direction::Withdraw)).unwrap(),
            "4CLDWDR\r"
        );
    }

    #[test]
    fn test_unknown_direction_rejected() {
        assert_eq!(
            encode(addr(0), &Command::SetDirection(Direction::Unknown)),
            Err(ValidationError::UnknownDirection)
        );
        assert_eq!(
            encode(addr(0), &Command::ClearDispensed(Direction::Unknown)),
            Err(ValidationError::UnknownDirection)
        );
    }

    #[test]
    fn test_control() {
        assert_eq!(encode(addr(0), &Command::Run).unwrap(), "0RUN\r");
        assert_eq!(encode(addr(5), &Command::Stop).unwrap(), "5STP\r");
        assert_eq!(encode_broadcast(&Command::Run).unwrap(), "*RUN\r");
        assert_eq!(encode_broadcast(&Command::Stop).unwrap(), "*STP\r");
    }

    #[test]
    fn test_set_address_is_broadcast() {
        let cmd = Command::SetAddress {
            address: addr(3),
            baud_rate: None,
        };
        assert_eq!(encode(addr(0), &cmd).unwrap(), "*ADR3\r");

        let cmd = Command::SetAddress {
            address: addr(1),
            baud_rate: Some(19200),
        };
        assert_eq!(encode(addr(9), &cmd).unwrap(), "*ADR1B19200\r");
    }

    #[test]
    fn test_batch() {
        let frame = encode_batch(&[
            (addr(0), Command::SetRate(RateValue::microliters_per_hour(100.0))),
            (addr(1), Command::SetRate(RateValue::microliters_per_hour(7500.0))),
        ])
        .unwrap();
        assert_eq!(frame, "0RAT100UH*1RAT7.5MH\r");
        assert_eq!(frame.matches('\r').count(), 1);
    }

    #[test]
    fn test_address_prefix_never_exceeds_two_digits() {
        for address in PumpAddress::all() {
            let line = encode(address, &Command::Run).unwrap();
            let prefix: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
            assert!(!prefix.is_empty() && prefix.len() <= 2, "{}", line);
        }
    }
}
