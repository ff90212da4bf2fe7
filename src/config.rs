use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::color::Color;
use crate::pixel_format::ColorOrder;
use crate::protocol::{DEFAULT_MAX_LEDS_PER_PACKET, MAX_LEDS_PER_PACKET_LIMIT};
use crate::resolver::{LightingMode, RenderSettings, DEFAULT_MAX_LEDS};
use crate::transport::SerialSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub opc: OpcConfig,
    pub output: OutputConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpcConfig {
    pub host: String,
    pub port: u16,
    /// OPC channel to listen on; 0 accepts every channel
    #[serde(default)]
    pub channel: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub port: String,
    #[serde(flatten)]
    pub serial: SerialSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// LEDs on the physical strip
    pub led_count: usize,
    #[serde(default)]
    pub lighting_mode: LightingMode,
    #[serde(default = "default_forced_color")]
    pub forced_color: Color,
    #[serde(default)]
    pub shutdown_color: Color,
    /// Shown, breathing, while no OPC client is sending
    #[serde(default = "default_pulse_color")]
    pub pulse_color: Color,
    #[serde(default)]
    pub color_order: ColorOrder,
    /// The controller freezes above ~85 LEDs
    #[serde(default = "default_max_leds")]
    pub max_leds: usize,
    #[serde(default = "default_max_leds_per_packet")]
    pub max_leds_per_packet: usize,
    #[serde(default = "default_packet_delay_ms")]
    pub packet_delay_ms: u64,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_pulse_timeout_ms")]
    pub pulse_timeout_ms: u64,
}

fn default_forced_color() -> Color {
    Color::new(0x00, 0x9b, 0xde)
}

fn default_pulse_color() -> Color {
    Color::new(0xff, 0xff, 0xff)
}

fn default_max_leds() -> usize {
    DEFAULT_MAX_LEDS
}

fn default_max_leds_per_packet() -> usize {
    DEFAULT_MAX_LEDS_PER_PACKET
}

fn default_packet_delay_ms() -> u64 {
    1
}

fn default_frame_rate() -> u32 {
    30
}

fn default_pulse_timeout_ms() -> u64 {
    2000
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_data = fs::read_to_string(path)
            .context(format!("Failed to read config {}", path.display()))?;
        Self::from_json(&config_data).context(format!("Invalid config {}", path.display()))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let device = &self.device;

        if !(1..=MAX_LEDS_PER_PACKET_LIMIT).contains(&device.max_leds_per_packet) {
            anyhow::bail!(
                "max_leds_per_packet must be between 1 and {}, got {}",
                MAX_LEDS_PER_PACKET_LIMIT,
                device.max_leds_per_packet
            );
        }

        if device.frame_rate == 0 {
            anyhow::bail!("frame_rate must not be 0");
        }

        Ok(())
    }
}

impl DeviceConfig {
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            mode: self.lighting_mode,
            forced_color: self.forced_color,
            shutdown_color: self.shutdown_color,
            color_order: self.color_order,
        }
    }

    pub fn packet_delay(&self) -> Duration {
        Duration::from_millis(self.packet_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate
    }

    pub fn pulse_timeout(&self) -> Duration {
        Duration::from_millis(self.pulse_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Parity, StopBits};

    const MINIMAL: &str = r#"{
        "opc": { "host": "127.0.0.1", "port": 7890 },
        "output": { "port": "/dev/ttyUSB0" },
        "device": { "led_count": 60 }
    }"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_json(MINIMAL).unwrap();

        assert_eq!(config.opc.channel, 0);
        assert_eq!(config.output.port, "/dev/ttyUSB0");
        assert_eq!(config.output.serial.baud_rate, 115200);
        assert_eq!(config.output.serial.stop_bits, StopBits::One);
        assert_eq!(config.output.serial.parity, Parity::None);

        let device = &config.device;
        assert_eq!(device.max_leds, 80);
        assert_eq!(device.max_leds_per_packet, 300);
        assert_eq!(device.packet_delay(), Duration::from_millis(1));
        assert_eq!(device.pulse_timeout(), Duration::from_secs(2));

        let settings = device.render_settings();
        assert_eq!(settings.mode, LightingMode::Canvas);
        assert_eq!(settings.forced_color, Color::new(0, 155, 222));
        assert_eq!(settings.shutdown_color, Color::BLACK);
        assert_eq!(settings.color_order, ColorOrder::Grb);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_json(
            r##"{
                "opc": { "host": "0.0.0.0", "port": 7890, "channel": 2 },
                "output": { "port": "COM3", "baud_rate": 230400, "parity": "Odd" },
                "device": {
                    "led_count": 120,
                    "lighting_mode": "Forced",
                    "forced_color": "#102030",
                    "shutdown_color": "#ff0000",
                    "color_order": "BGR",
                    "max_leds": 100,
                    "frame_rate": 50
                }
            }"##,
        )
        .unwrap();

        assert_eq!(config.opc.channel, 2);
        assert_eq!(config.output.serial.baud_rate, 230400);
        assert_eq!(config.output.serial.parity, Parity::Odd);
        assert_eq!(config.device.lighting_mode, LightingMode::Forced);
        assert_eq!(config.device.forced_color, Color::new(0x10, 0x20, 0x30));
        assert_eq!(config.device.color_order, ColorOrder::Bgr);
        assert_eq!(config.device.max_leds, 100);
        assert_eq!(config.device.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero_rate = MINIMAL.replace("\"led_count\": 60", "\"led_count\": 60, \"frame_rate\": 0");
        assert!(Config::from_json(&zero_rate).is_err());

        let huge_packet =
            MINIMAL.replace("\"led_count\": 60", "\"led_count\": 60, \"max_leds_per_packet\": 30000");
        assert!(Config::from_json(&huge_packet).is_err());

        let bad_color = MINIMAL.replace("\"led_count\": 60", "\"led_count\": 60, \"forced_color\": \"blue\"");
        assert!(Config::from_json(&bad_color).is_err());

        let bad_mode = MINIMAL.replace("\"led_count\": 60", "\"led_count\": 60, \"lighting_mode\": \"Party\"");
        assert!(Config::from_json(&bad_mode).is_err());
    }
}
