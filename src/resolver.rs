use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::pixel_format::{create_color_array, ColorOrder};

pub const DEFAULT_MAX_LEDS: usize = 80;

/// Where the device's colors come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum LightingMode {
    /// Live data from the channel's canvas
    #[default]
    Canvas,
    /// Fixed `forced_color` on every LED
    Forced,
}

/// User-facing render parameters, read fresh on every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub mode: LightingMode,
    pub forced_color: Color,
    pub shutdown_color: Color,
    pub color_order: ColorOrder,
}

/// A logical group of LEDs owned by the host
pub trait LedChannel {
    fn led_count(&self) -> usize;

    fn should_pulse_colors(&self) -> bool;

    /// Live canvas colors in the given channel order, 3 bytes per LED
    fn colors(&self, order: ColorOrder) -> Vec<u8>;

    /// Single color to broadcast while pulsing
    fn pulse_color(&self, count: usize) -> Color;
}

/// Colors for one frame, already in transmission channel order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub data: Vec<u8>,
    pub led_count: usize,
}

/// Picks the color source for a frame
#[derive(Debug, Clone, Copy)]
pub struct FrameResolver {
    max_leds: usize,
}

impl FrameResolver {
    pub fn new(max_leds: usize) -> Self {
        FrameResolver { max_leds }
    }

    pub fn max_leds(&self) -> usize {
        self.max_leds
    }

    /// Resolve the colors for one frame. Shutdown beats forced mode, which
    /// beats pulsing, which beats canvas data.
    pub fn resolve<C: LedChannel + ?Sized>(
        &self,
        settings: &RenderSettings,
        shutdown: bool,
        channel: &C,
    ) -> ResolvedFrame {
        let order = settings.color_order;
        let led_count = channel.led_count().min(self.max_leds);

        if shutdown {
            return solid(settings.shutdown_color, led_count, order);
        }

        if settings.mode == LightingMode::Forced {
            return solid(settings.forced_color, led_count, order);
        }

        if channel.should_pulse_colors() {
            // Pulsing always lights the whole budget
            let pulse = channel.pulse_color(self.max_leds);
            return solid(pulse, self.max_leds, order);
        }

        let mut data = channel.colors(order);
        data.resize(led_count * 3, 0);

        ResolvedFrame { data, led_count }
    }
}

impl Default for FrameResolver {
    fn default() -> Self {
        FrameResolver::new(DEFAULT_MAX_LEDS)
    }
}

fn solid(color: Color, led_count: usize, order: ColorOrder) -> ResolvedFrame {
    ResolvedFrame {
        data: create_color_array(color, led_count, order),
        led_count,
    }
}
