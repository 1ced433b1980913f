//! Serial port handling
//!
//! Port discovery and async port opening for the peripheral's USB-serial link.

use serialport::{SerialPortInfo, SerialPortType};
#[cfg(target_os = "linux")]
use std::fs;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, warn};

use super::ProtocolError;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

/// USB vendor IDs of the boards and USB-serial bridges the peripheral ships on
const KNOWN_VENDORS: &[(u16, &str)] = &[
    (0x2341, "Arduino"),
    (0x2a03, "Arduino"),
    (0x1a86, "WCH CH340"),
    (0x0403, "FTDI"),
    (0x10c4, "Silicon Labs CP210x"),
];

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }

    /// `vid:pid` in hex, for USB ports
    pub fn usb_id(&self) -> Option<String> {
        Some(format!("{:04x}:{:04x}", self.vid?, self.pid?))
    }

    /// Board family, if the USB vendor is one the peripheral is built on
    pub fn known_vendor(&self) -> Option<&'static str> {
        let vid = self.vid?;
        KNOWN_VENDORS
            .iter()
            .find(|(known, _)| *known == vid)
            .map(|(_, name)| *name)
    }

    /// Known boards first, then ttyACM, ttyUSB and COM ports by number,
    /// then everything else by name
    fn sort_key(&self) -> (bool, u8, u32, &str) {
        let base = self.name.rsplit('/').next().unwrap_or(&self.name);
        let numbered = [(0, "ttyACM"), (1, "ttyUSB"), (2, "COM")]
            .into_iter()
            .find_map(|(family, prefix)| Some((family, base.strip_prefix(prefix)?)));
        let (family, index) = match numbered {
            Some((family, digits)) => (family, digits.parse().unwrap_or(u32::MAX)),
            None => (3, 0),
        };
        (self.known_vendor().is_none(), family, index, base)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                name: info.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// List available serial ports, most likely peripheral first
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = match serialport::available_ports() {
        Ok(found) => found.into_iter().map(PortInfo::from).collect(),
        Err(e) => {
            warn!("serial port enumeration failed: {e}");
            Vec::new()
        }
    };

    // Linux: CDC-ACM devices without udev metadata can be missing from enumeration
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        let extra: Vec<PortInfo> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with("ttyACM") || name.starts_with("ttyUSB"))
            .map(|name| format!("/dev/{name}"))
            .filter(|path| !ports.iter().any(|p| &p.name == path))
            .map(PortInfo::bare)
            .collect();
        ports.extend(extra);
    }

    sort_ports(&mut ports);
    ports.dedup_by(|a, b| a.name == b.name);
    ports
}

/// Open a serial port as an async stream, 8N1 without flow control
pub fn open_port(name: &str, baud_rate: u32) -> Result<SerialStream, ProtocolError> {
    let mut port = tokio_serial::new(name, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(|e| ProtocolError::OpenFailure(format!("{}: {}", name, e)))?;

    // Keep DTR asserted so the board does not drop into its bootloader
    if let Err(e) = port.write_data_terminal_ready(true) {
        debug!("failed to set DTR on {name}: {e} (continuing)");
    }

    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // Only checks enumeration does not panic on this host
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    fn usb(name: &str, vid: u16, pid: u16) -> PortInfo {
        PortInfo {
            vid: Some(vid),
            pid: Some(pid),
            ..PortInfo::bare(name.to_string())
        }
    }

    fn names(ports: Vec<PortInfo>) -> Vec<String> {
        ports.into_iter().map(|p| p.name).collect()
    }

    #[test]
    fn test_port_sorting() {
        let mut ports: Vec<PortInfo> = [
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "COM10",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/someport",
            "COM3",
            "/dev/ttyACM10",
        ]
        .into_iter()
        .map(|n| PortInfo::bare(n.to_string()))
        .collect();

        sort_ports(&mut ports);
        assert_eq!(
            names(ports),
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "COM3",
                "COM10",
                "/dev/someport",
            ]
        );
    }

    #[test]
    fn test_known_boards_sort_first() {
        let mut ports = vec![
            PortInfo::bare("/dev/ttyACM0".to_string()),
            usb("/dev/ttyUSB0", 0x067b, 0x2303),
            usb("/dev/ttyUSB1", 0x1a86, 0x7523),
            usb("/dev/ttyACM1", 0x2341, 0x0043),
        ];
        sort_ports(&mut ports);
        assert_eq!(
            names(ports),
            vec![
                "/dev/ttyACM1",
                "/dev/ttyUSB1",
                "/dev/ttyACM0",
                "/dev/ttyUSB0",
            ]
        );
    }

    #[test]
    fn test_vendor_lookup_and_usb_id() {
        let uno = usb("/dev/ttyACM0", 0x2341, 0x0043);
        assert_eq!(uno.known_vendor(), Some("Arduino"));
        assert_eq!(uno.usb_id().as_deref(), Some("2341:0043"));

        let other = usb("/dev/ttyUSB0", 0x067b, 0x2303);
        assert_eq!(other.known_vendor(), None);

        let bare = PortInfo::bare("/dev/ttyS0".to_string());
        assert_eq!(bare.usb_id(), None);
        assert_eq!(bare.known_vendor(), None);
    }

    #[tokio::test]
    async fn test_open_missing_port_is_open_failure() {
        let result = open_port("/dev/joylink-does-not-exist", 9600);
        assert!(matches!(result, Err(ProtocolError::OpenFailure(_))));
    }
}
