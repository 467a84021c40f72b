//! syringectl - drive New Era style syringe pumps from the shell

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use syringectl_core::prelude::*;
use syringectl_core::protocol::list_ports;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Commands;

#[derive(Debug, Parser)]
#[command(
    name = "syringectl",
    version,
    about = "Control New Era style syringe pumps over RS-232",
    long_about = None
)]
struct Cli {
    /// Serial port to use instead of probing the configured candidates
    #[arg(long, global = true, value_name = "PORT", env = "SYRINGECTL_PORT")]
    port: Option<String>,

    /// Bus baud rate
    #[arg(long, global = true, value_name = "BAUD")]
    baud: Option<u32>,

    /// Wait between a command and its reply, in milliseconds
    #[arg(long = "settle-ms", global = true, value_name = "MS")]
    settle_ms: Option<u64>,

    /// JSON session configuration
    #[arg(long, global = true, value_name = "FILE", env = "SYRINGECTL_CONFIG")]
    config: Option<PathBuf>,

    /// Pump address (0-99)
    #[arg(short, long, global = true, value_name = "N")]
    address: Option<u32>,

    /// Talk to a simulated pump instead of the serial port
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    simulate: bool,

    /// Log protocol traffic (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Configuration file (or defaults) with command line overrides applied
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => SessionConfig::default(),
        };
        if let Some(port) = &self.port {
            config.candidate_ports = vec![port.clone()];
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(settle_ms) = self.settle_ms {
            config.settle_ms = settle_ms;
        }
        if let Some(address) = self.address {
            config.default_address = PumpAddress::new(address)?;
        }
        Ok(config)
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_session(config: &SessionConfig, simulate: bool) -> Result<PumpSession<Box<dyn Transport>>> {
    let transport: Box<dyn Transport> = if simulate {
        debug!("Using simulated pump at address {}", config.default_address);
        Box::new(SimulatedPump::new(config.default_address))
    } else {
        let ports = config.resolved_ports();
        Box::new(SerialTransport::open(&ports, config.baud_rate, config.settle())?)
    };
    Ok(PumpSession::new(transport))
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  [{:04x}:{:04x}] {}",
                port.name,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}", port.name),
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if matches!(cli.command, Commands::Ports) {
        print_ports();
        return Ok(());
    }
    let config = cli.session_config()?;
    let mut session = open_session(&config, cli.simulate)?;
    commands::execute(&mut session, config.default_address, cli.command)
}

/// Exit status for a failed run, by error kind
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<SessionError>() {
        Some(SessionError::Connection(_)) => 2,
        Some(SessionError::Response(_)) | Some(SessionError::DirectionNotConfirmed { .. }) => 3,
        Some(SessionError::Validation(_)) => 4,
        Some(SessionError::Transport(_)) => 5,
        None if err.downcast_ref::<ConnectionError>().is_some() => 2,
        None if err.downcast_ref::<ValidationError>().is_some() => 4,
        None => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "syringectl",
            "--port",
            "/dev/ttyUSB1",
            "--baud",
            "9600",
            "-a",
            "3",
            "run",
        ]);
        let config = cli.session_config().unwrap();
        assert_eq!(config.candidate_ports, vec!["/dev/ttyUSB1".to_string()]);
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.settle_ms, 250);
        assert_eq!(config.default_address.value(), 3);
    }

    #[test]
    fn test_address_out_of_range() {
        let cli = Cli::parse_from(["syringectl", "--address", "100", "run"]);
        let err = cli.session_config().unwrap_err();
        assert_eq!(exit_code(&err), 4);
    }

    #[test]
    fn test_missing_port_exits_with_connection_code() {
        let cli = Cli::parse_from([
            "syringectl",
            "--port",
            "/dev/does-not-exist-a",
            "--settle-ms",
            "1",
            "run",
        ]);
        let err = run(cli).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConnectionError>(),
            Some(ConnectionError::NoDeviceFound { tried }) if tried == &["/dev/does-not-exist-a"]
        ));
        assert_eq!(exit_code(&err), 2);

        let wrapped = anyhow::Error::from(SessionError::from(ConnectionError::NoDeviceFound {
            tried: Vec::new(),
        }));
        assert_eq!(exit_code(&wrapped), 2);
    }

    #[test]
    fn test_simulated_run() {
        let cli = Cli::parse_from(["syringectl", "--simulate", "--address", "2", "dir", "reverse"]);
        run(cli).unwrap();
    }
}
