use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortType};
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use crate::device::DeviceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Line settings for the serial link
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SerialSettings {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub parity: Parity,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

impl Default for SerialSettings {
    fn default() -> Self {
        SerialSettings {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: StopBits::default(),
            parity: Parity::default(),
        }
    }
}

impl SerialSettings {
    fn data_bits(&self) -> Result<serialport::DataBits> {
        Ok(match self.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => anyhow::bail!("Unsupported data bits: {}", other),
        })
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(stop_bits: StopBits) -> Self {
        match stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Byte sink towards the LED controller. Writes are fire-and-forget.
pub trait Transport {
    fn connect(&mut self, settings: &SerialSettings) -> Result<()>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    fn device_info(&self) -> DeviceInfo;
}

/// Transport over a named serial port
pub struct SerialTransport {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>) -> Self {
        SerialTransport {
            port_name: port_name.into(),
            port: None,
        }
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self, settings: &SerialSettings) -> Result<()> {
        let mut port = serialport::new(&self.port_name, settings.baud_rate)
            .data_bits(settings.data_bits()?)
            .parity(settings.parity.into())
            .stop_bits(settings.stop_bits.into())
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(1000))
            .open()
            .context(format!("Failed to open serial port {}", self.port_name))?;

        if let Err(e) = port.write_data_terminal_ready(true) {
            warn!("Failed to set DTR on {}: {}", self.port_name, e);
        }

        // Allow device to initialize
        thread::sleep(Duration::from_millis(100));

        debug!(
            "Opened {} @ {} baud ({} data bits, {:?} stop, {:?} parity)",
            self.port_name, settings.baud_rate, settings.data_bits, settings.stop_bits, settings.parity
        );

        self.port = Some(port);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut port) = self.port.take() {
            let _ = port.flush();
            debug!("Closed {}", self.port_name);
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))?;

        let result = port.write_all(data).and_then(|_| port.flush());
        if result.is_err() {
            // A failed port is dropped; the host reconnects later
            self.port = None;
        }
        result
    }

    fn device_info(&self) -> DeviceInfo {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                debug!("Could not list serial ports: {}", e);
                return DeviceInfo::fallback();
            }
        };

        ports
            .iter()
            .find(|p| p.port_name == self.port_name)
            .and_then(|p| match &p.port_type {
                SerialPortType::UsbPort(usb) => Some(DeviceInfo::from(usb)),
                _ => None,
            })
            .unwrap_or_else(DeviceInfo::fallback)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every write; can be told to fail on the n-th write
    #[derive(Default)]
    pub(crate) struct MemoryTransport {
        pub connected: bool,
        pub writes: Vec<Vec<u8>>,
        pub fail_on_write: Option<usize>,
        pub connects: usize,
    }

    impl MemoryTransport {
        pub(crate) fn connected() -> Self {
            MemoryTransport {
                connected: true,
                ..Default::default()
            }
        }
    }

    impl Transport for MemoryTransport {
        fn connect(&mut self, _settings: &SerialSettings) -> Result<()> {
            self.connects += 1;
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn write(&mut self, data: &[u8]) -> io::Result<()> {
            if self.fail_on_write == Some(self.writes.len()) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            self.writes.push(data.to_vec());
            Ok(())
        }

        fn device_info(&self) -> DeviceInfo {
            DeviceInfo::fallback()
        }
    }

    #[test]
    fn test_default_settings_are_115200_8n1() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.parity, Parity::None);
    }

    #[test]
    fn test_settings_from_json() {
        let settings: SerialSettings =
            serde_json::from_str(r#"{"baud_rate": 230400, "parity": "Even"}"#).unwrap();
        assert_eq!(settings.baud_rate, 230400);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.parity, Parity::Even);
    }

    #[test]
    fn test_unsupported_data_bits() {
        let settings = SerialSettings {
            data_bits: 9,
            ..Default::default()
        };
        assert!(settings.data_bits().is_err());
    }

    #[test]
    fn test_closed_serial_transport_refuses_writes() {
        let mut transport = SerialTransport::new("/dev/does-not-exist");
        assert!(!transport.is_connected());

        let err = transport.write(&[0x00]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
