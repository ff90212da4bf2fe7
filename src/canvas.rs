use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::color::Color;
use crate::pixel_format::{transform_pixels, ColorOrder};
use crate::resolver::LedChannel;

const BREATHE_PERIOD: Duration = Duration::from_millis(2000);

struct CanvasState {
    /// RGB, 3 bytes per LED
    pixels: Vec<u8>,
    last_update: Option<Instant>,
}

/// Pixel buffer of the device's only channel, fed by OPC clients
#[derive(Clone)]
pub struct Canvas {
    state: Arc<Mutex<CanvasState>>,
    led_count: usize,
    pulse_color: Color,
    pulse_timeout: Duration,
    created: Instant,
}

impl Canvas {
    pub fn new(led_count: usize, pulse_color: Color, pulse_timeout: Duration) -> Self {
        Canvas {
            state: Arc::new(Mutex::new(CanvasState {
                pixels: vec![0; led_count * 3],
                last_update: None,
            })),
            led_count,
            pulse_color,
            pulse_timeout,
            created: Instant::now(),
        }
    }

    /// Store a frame of RGB data. Extra pixels are dropped, missing ones go black.
    pub fn set_pixels(&self, data: &[u8]) {
        let mut state = self.lock();
        let len = (self.led_count * 3).min(data.len());

        state.pixels[..len].copy_from_slice(&data[..len]);
        state.pixels[len..].fill(0);
        state.last_update = Some(Instant::now());
    }

    fn lock(&self) -> MutexGuard<'_, CanvasState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn breathe_level(&self) -> u8 {
        let period = BREATHE_PERIOD.as_millis();
        let phase = self.created.elapsed().as_millis() % period;
        let half = period / 2;

        let ramp = if phase < half { phase } else { period - phase };
        (ramp * 255 / half) as u8
    }
}

impl LedChannel for Canvas {
    fn led_count(&self) -> usize {
        self.led_count
    }

    fn should_pulse_colors(&self) -> bool {
        match self.lock().last_update {
            Some(at) => at.elapsed() > self.pulse_timeout,
            None => true,
        }
    }

    fn colors(&self, order: ColorOrder) -> Vec<u8> {
        let pixels = self.lock().pixels.clone();
        transform_pixels(pixels, order)
    }

    fn pulse_color(&self, _count: usize) -> Color {
        self.pulse_color.scaled(self.breathe_level())
    }
}
