//! Serial port discovery and low-level access
//!
//! Pumps hang off USB-RS232 adapters, so adapter device names are listed
//! first when probing.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{TransportError, DEFAULT_BAUD_RATE};

/// Port name of the common USB-serial adapter on macOS
pub const MACOS_USB_SERIAL: &str = "/dev/tty.usbserial";

/// Number of `COMn` names tried on Windows
pub const WINDOWS_COM_PORTS: usize = 10;

/// Device name prefixes in probing order; numbered names sort by number
const ADAPTER_PREFIXES: [&str; 4] = ["tty.usbserial", "ttyUSB", "ttyACM", "COM"];

/// A serial port found on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path or name, `/dev/ttyUSB0`, `COM3`
    pub name: String,
    /// USB vendor ID for USB adapters
    pub vid: Option<u16>,
    /// USB product ID for USB adapters
    pub pid: Option<u16>,
    /// Adapter product string, when the OS reports one
    pub product: Option<String>,
}

impl PortInfo {
    fn named(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
            },
            _ => Self::named(info.port_name),
        }
    }
}

/// Probing rank of a port name: (prefix rank, number suffix, basename)
fn probe_rank(name: &str) -> (usize, u32, String) {
    let basename = name.rsplit('/').next().unwrap_or(name).to_string();
    for (rank, prefix) in ADAPTER_PREFIXES.iter().enumerate() {
        if let Some(suffix) = basename.strip_prefix(prefix) {
            let number = suffix.parse().unwrap_or(u32::MAX);
            return (rank, number, basename);
        }
    }
    (ADAPTER_PREFIXES.len(), 0, basename)
}

/// Device nodes for USB-serial adapters the enumeration API can miss
#[cfg(target_os = "linux")]
fn linux_adapter_nodes() -> Vec<String> {
    std::fs::read_dir("/dev")
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name.starts_with("ttyUSB") || name.starts_with("ttyACM"))
                .map(|name| format!("/dev/{}", name))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn linux_adapter_nodes() -> Vec<String> {
    Vec::new()
}

/// Serial ports on this machine, USB adapters first
pub fn list_ports() -> Vec<PortInfo> {
    let mut found: BTreeMap<String, PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let port = PortInfo::from(info);
            (port.name.clone(), port)
        })
        .collect();
    for node in linux_adapter_nodes() {
        found
            .entry(node.clone())
            .or_insert_with(|| PortInfo::named(node));
    }

    let mut ports: Vec<PortInfo> = found.into_values().collect();
    ports.sort_by_key(|port| probe_rank(&port.name));
    ports
}

/// Ports to probe when none is configured: the macOS adapter name, every
/// enumerated port, then `COM1`..`COM10` on Windows
pub fn default_candidate_ports() -> Vec<String> {
    let mut candidates = Vec::new();
    if cfg!(target_os = "macos") {
        candidates.push(MACOS_USB_SERIAL.to_string());
    }
    for port in list_ports() {
        if !candidates.contains(&port.name) {
            candidates.push(port.name);
        }
    }
    if cfg!(windows) {
        for i in 1..=WINDOWS_COM_PORTS {
            let name = format!("COM{}", i);
            if !candidates.contains(&name) {
                candidates.push(name);
            }
        }
    }
    candidates
}

/// Read timeout for a single `read` call; replies are collected after the settle wait
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Open a port, at [`DEFAULT_BAUD_RATE`] unless told otherwise
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, TransportError> {
    let port = serialport::new(name, baud_rate.unwrap_or(DEFAULT_BAUD_RATE))
        .timeout(READ_TIMEOUT)
        .open()?;
    Ok(port)
}

/// Configure a serial port for the pump bus (8N1, no flow control)
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), TransportError> {
    port.set_data_bits(serialport::DataBits::Eight)?;
    port.set_parity(serialport::Parity::None)?;
    port.set_stop_bits(serialport::StopBits::One)?;
    port.set_flow_control(serialport::FlowControl::None)?;
    Ok(())
}

/// Drop anything pending in the input and output buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), TransportError> {
    Ok(port.clear(serialport::ClearBuffer::All)?)
}

/// Read every byte currently buffered without waiting for more
pub fn read_available(port: &mut dyn SerialPort) -> Result<Vec<u8>, TransportError> {
    let mut response = Vec::new();
    let mut buffer = [0u8; 256];
    loop {
        let available = port.bytes_to_read()? as usize;
        if available == 0 {
            break;
        }
        let to_read = available.min(buffer.len());
        match port.read(&mut buffer[..to_read]) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&buffer[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                break
            }
            Err(e) => return Err(TransportError::Io(e)),
        }
    }
    debug!(
        "read_available: {} bytes: {:?}",
        response.len(),
        String::from_utf8_lossy(&response)
    );
    Ok(response)
}
