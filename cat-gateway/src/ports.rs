//! Serial port listing for `--list-ports`

use serialport::{available_ports, SerialPortType};

/// A serial port and what the OS knows about it
#[derive(Debug, Clone)]
pub struct PortEntry {
    pub name: String,
    pub description: Option<String>,
}

impl PortEntry {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        let description = match port_type {
            SerialPortType::UsbPort(usb) => Some(match (&usb.manufacturer, &usb.product) {
                (Some(m), Some(p)) => format!("{} {} [{:04x}:{:04x}]", m, p, usb.vid, usb.pid),
                (None, Some(p)) => format!("{} [{:04x}:{:04x}]", p, usb.vid, usb.pid),
                _ => format!("USB [{:04x}:{:04x}]", usb.vid, usb.pid),
            }),
            SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
            SerialPortType::PciPort => Some("PCI".to_string()),
            SerialPortType::Unknown => None,
        };
        Self { name, description }
    }

    pub fn display_label(&self) -> String {
        match &self.description {
            Some(desc) => format!("{} ({})", self.name, desc),
            None => self.name.clone(),
        }
    }
}

/// Enumerate serial ports
pub fn list_ports() -> anyhow::Result<Vec<PortEntry>> {
    let ports = available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| PortEntry::from_serialport(p.port_name, &p.port_type))
        .collect())
}
