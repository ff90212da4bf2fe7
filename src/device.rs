/// Identity of the supported controller (ESP32 behind a CP210x bridge)
pub const DEVICE_NAME: &str = "Silicon Labs CP210x";
pub const VENDOR_ID: u16 = 0x10C4;
pub const PRODUCT_ID: u16 = 0xEA60;

pub const CHANNEL_NAME: &str = "Channel 1";

/// What the OS reports about the connected port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub driver_desc: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceInfo {
    /// Info for a port the OS has nothing to say about
    pub fn fallback() -> Self {
        DeviceInfo {
            driver_desc: DEVICE_NAME.to_string(),
            vendor_id: None,
            product_id: None,
        }
    }

    /// Whether the port reports the expected USB bridge
    pub fn is_expected_bridge(&self) -> bool {
        self.vendor_id == Some(VENDOR_ID) && self.product_id == Some(PRODUCT_ID)
    }
}

impl From<&serialport::UsbPortInfo> for DeviceInfo {
    fn from(usb: &serialport::UsbPortInfo) -> Self {
        DeviceInfo {
            driver_desc: usb
                .product
                .clone()
                .unwrap_or_else(|| DEVICE_NAME.to_string()),
            vendor_id: Some(usb.vid),
            product_id: Some(usb.pid),
        }
    }
}
