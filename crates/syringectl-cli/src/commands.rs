//! Subcommands and their dispatch onto a [`PumpSession`]

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use syringectl_core::prelude::*;
use syringectl_core::protocol::{ProtocolResponse, MAX_ADDRESS};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List serial ports on this machine
    Ports,
    /// Find the addresses pumps answer on
    Scan {
        /// Highest address to try
        #[arg(long, default_value_t = MAX_ADDRESS as u32)]
        max: u32,
    },
    /// Show or set the pumping rate (`100`, `100uh`, `7.5mh`; bare numbers are µL/h)
    Rate {
        value: Option<RateValue>,
        /// Show the rate in the unit the pump reports instead of µL/h
        #[arg(long, action = clap::ArgAction::SetTrue)]
        native: bool,
    },
    /// Show, set or reverse the pumping direction
    Dir {
        #[arg(value_enum)]
        action: Option<DirAction>,
    },
    /// Show or set the syringe (1ml, 3ml, 5ml, 10ml, 20ml, 60ml)
    Dia { size: Option<SyringeSize> },
    /// Show the dispense volume, set it, or set its unit (ul, ml)
    Vol { value: Option<String> },
    /// Start pumping
    Run,
    /// Pause a running pump, or stop a paused one
    Stop,
    /// Show dispensed totals, or clear one direction
    Dispensed {
        #[arg(long, value_name = "inf|wdr")]
        clear: Option<Direction>,
    },
    /// Reassign the address of the only pump on the bus
    SetAddress {
        new_address: u32,
        /// Also switch the pump to this baud rate
        #[arg(long)]
        baud: Option<u32>,
    },
    /// Set several pumps' rates in one frame
    BatchRates {
        #[arg(value_name = "ADDR=RATE", value_parser = parse_batch_entry, required = true, num_args = 1..)]
        entries: Vec<(PumpAddress, RateValue)>,
    },
    /// Start every pump on the bus
    RunAll,
    /// Stop every pump on the bus
    StopAll,
    /// Run at 10 mL/h to fill the line
    Prime,
    /// Stop and zero the rate
    Halt,
    /// Send a command line verbatim and show the parsed replies
    Raw { command: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirAction {
    Inf,
    Wdr,
    Reverse,
}

/// Parse `ADDR=RATE`, e.g. `1=7.5mh`
fn parse_batch_entry(s: &str) -> Result<(PumpAddress, RateValue), String> {
    let (address, rate) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=RATE, got '{}'", s))?;
    let address: u32 = address
        .trim()
        .parse()
        .map_err(|_| format!("invalid address '{}'", address))?;
    let address = PumpAddress::new(address).map_err(|e| e.to_string())?;
    let rate: RateValue = rate.parse().map_err(|e: ValidationError| e.to_string())?;
    Ok((address, rate))
}

fn describe(response: &ProtocolResponse) -> String {
    match response {
        ProtocolResponse::Payload(payload) => match &payload.data {
            Some(data) => format!("pump {}: {:?} {}", payload.address, payload.status, data),
            None => format!("pump {}: {:?}", payload.address, payload.status),
        },
        ProtocolResponse::Error(e) => format!("error: {}", e),
    }
}

fn print_responses(responses: &[ProtocolResponse]) {
    if responses.is_empty() {
        println!("no reply");
    }
    for response in responses {
        println!("{}", describe(response));
    }
}

pub fn execute<T: Transport>(
    session: &mut PumpSession<T>,
    address: PumpAddress,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Ports => bail!("ports does not use a pump session"),
        Commands::Scan { max } => {
            let max = PumpAddress::new(max)?;
            let found = session.discover(PumpAddress::all().take_while(|a| *a <= max))?;
            if found.is_empty() {
                println!("No pump answered");
            }
            for address in found {
                println!("pump at address {}", address);
            }
        }
        Commands::Rate { value: Some(rate), .. } => {
            session.set_rate(address, rate)?;
            println!("rate set to {}", rate.normalized());
        }
        Commands::Rate { value: None, native } => {
            let rate = if native {
                session.query_rate_native(address)?
            } else {
                session.query_rate(address)?
            };
            println!("{}", rate);
        }
        Commands::Dir { action: None } => {
            println!("{}", session.query_direction(address)?);
        }
        Commands::Dir {
            action: Some(DirAction::Reverse),
        } => {
            let direction = session.reverse_direction(address)?;
            println!("direction now {}", direction);
        }
        Commands::Dir {
            action: Some(action),
        } => {
            let direction = match action {
                DirAction::Inf => Direction::Infuse,
                _ => Direction::Withdraw,
            };
            session.set_direction(address, direction)?;
            println!("direction set to {}", direction);
        }
        Commands::Dia { size: Some(size) } => {
            session.set_diameter(address, size)?;
            println!("syringe set to {} ({} mm)", size, size.bore());
        }
        Commands::Dia { size: None } => {
            println!("{}", session.query_diameter(address)?);
        }
        Commands::Vol { value: None } => {
            println!("{}", session.query_volume(address)?);
        }
        Commands::Vol { value: Some(value) } => {
            if let Ok(unit) = value.parse::<VolumeUnit>() {
                session.set_volume_unit(address, unit)?;
                println!("volume unit set to {}", unit);
            } else {
                let volume: f64 = value
                    .parse()
                    .with_context(|| format!("'{}' is neither a volume nor a unit", value))?;
                session.set_volume(address, volume)?;
                println!("volume set to {}", volume);
            }
        }
        Commands::Run => {
            let status = session.run(address)?;
            println!("{:?}", status);
        }
        Commands::Stop => {
            let status = session.stop(address)?;
            println!("{:?}", status);
        }
        Commands::Dispensed { clear: Some(direction) } => {
            session.clear_dispensed(address, direction)?;
            println!("cleared {} total", direction);
        }
        Commands::Dispensed { clear: None } => {
            println!("{}", session.query_dispensed(address)?);
        }
        Commands::SetAddress { new_address, baud } => {
            let new_address = PumpAddress::new(new_address)?;
            session.set_address(new_address, baud)?;
            println!("pump now at address {}", new_address);
        }
        Commands::BatchRates { entries } => {
            print_responses(&session.set_rates_batched(&entries)?);
        }
        Commands::RunAll => print_responses(&session.run_all()?),
        Commands::StopAll => print_responses(&session.stop_all()?),
        Commands::Prime => {
            let status = session.prime(address)?;
            println!("priming: {:?}", status);
        }
        Commands::Halt => {
            session.halt(address)?;
            println!("halted");
        }
        Commands::Raw { command } => print_responses(&session.exchange_raw(&command)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn simulated() -> PumpSession<SimulatedPump> {
        PumpSession::new(SimulatedPump::default())
    }

    #[test]
    fn test_parse_batch_entry() {
        let (address, rate) = parse_batch_entry("1=7.5mh").unwrap();
        assert_eq!(address.value(), 1);
        assert_eq!(rate, RateValue::milliliters_per_hour(7.5));

        assert!(parse_batch_entry("1:7.5mh").is_err());
        assert!(parse_batch_entry("100=5").is_err());
        assert!(parse_batch_entry("0=fast").is_err());
    }

    #[test]
    fn test_set_then_reverse() {
        let mut session = simulated();
        let pump = PumpAddress::DEFAULT;
        execute(&mut session, pump, Commands::Dir { action: Some(DirAction::Wdr) }).unwrap();
        execute(&mut session, pump, Commands::Dir { action: Some(DirAction::Reverse) }).unwrap();
        assert_eq!(session.query_direction(pump).unwrap(), Direction::Infuse);
    }

    #[test]
    fn test_vol_accepts_unit_or_number() {
        let mut session = simulated();
        let pump = PumpAddress::DEFAULT;
        execute(&mut session, pump, Commands::Vol { value: Some("ul".into()) }).unwrap();
        execute(&mut session, pump, Commands::Vol { value: Some("12.5".into()) }).unwrap();
        let reading = session.query_volume(pump).unwrap();
        assert_eq!(reading.value, 12.5);
        assert_eq!(reading.unit, VolumeUnit::Microliters);

        let result = execute(&mut session, pump, Commands::Vol { value: Some("lots".into()) });
        assert!(result.is_err());
    }

    #[test]
    fn test_stop_when_stopped_is_pump_error() {
        let mut session = simulated();
        let err = execute(&mut session, PumpAddress::DEFAULT, Commands::Stop).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::Response(ResponseError::NotApplicable))
        ));
    }
}
