//! Serial port transport built on the `serialport` crate.

use std::io;

use serialport::SerialPortType;
use tracing::debug;

use super::{PortHandles, PortOpener, PortSettings};

/// Opens real serial devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    fn open(&self, settings: &PortSettings) -> io::Result<PortHandles> {
        let port = serialport::new(&settings.path, settings.baud_rate)
            .timeout(settings.read_timeout)
            .open()?;
        // One handle per direction: the reader lives on the read task, the
        // writer behind the link's mutex.
        let reader = port.try_clone()?;
        debug!(port = %settings.path, "serial port opened");
        Ok(PortHandles {
            writer: Box::new(port),
            reader: Box::new(reader),
        })
    }
}

/// A port the platform reports, for the `ports` console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescription {
    pub name: String,
    pub kind: String,
}

/// Lists serial ports present on this machine.
///
/// # Errors
///
/// Returns the enumeration error from the platform.
pub fn available_ports() -> io::Result<Vec<PortDescription>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| PortDescription {
            kind: describe_port_type(&p.port_type),
            name: p.port_name,
        })
        .collect())
}

fn describe_port_type(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(info) => {
            let product = info.product.as_deref().unwrap_or("USB serial");
            format!("{product} ({:04x}:{:04x})", info.vid, info.pid)
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}
