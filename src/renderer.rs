use anyhow::Result;
use log::{info, log_enabled, trace, warn, Level};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::device::{DeviceInfo, CHANNEL_NAME};
use crate::protocol::{FrameError, PacketFramer};
use crate::resolver::{FrameResolver, LedChannel, RenderSettings};
use crate::transport::{SerialSettings, Transport};

/// Gap after every packet so the controller's UART buffer keeps up
pub const DEFAULT_PACKET_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("transport is not connected")]
    TransportUnavailable,
    #[error("write of packet {packet}/{total} failed")]
    TransportWrite {
        packet: usize,
        total: usize,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Resolves, frames and transmits one frame per tick
pub struct Renderer<T: Transport> {
    resolver: FrameResolver,
    framer: PacketFramer,
    transport: T,
    packet_delay: Duration,
    delay: Box<dyn FnMut(Duration)>,
    frames_sent: Arc<AtomicU64>,
}

impl<T: Transport> Renderer<T> {
    pub fn new(
        resolver: FrameResolver,
        framer: PacketFramer,
        transport: T,
        packet_delay: Duration,
    ) -> Self {
        Renderer {
            resolver,
            framer,
            transport,
            packet_delay,
            delay: Box::new(thread::sleep),
            frames_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the pacing pause (tests use a no-op)
    pub fn with_delay(mut self, delay: impl FnMut(Duration) + 'static) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get a clone of the frames sent counter (for statistics)
    pub fn frames_sent_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_sent)
    }

    /// (Re)open the link and report what is on the other end
    pub fn initialize(&mut self, settings: &SerialSettings) -> Result<DeviceInfo> {
        let info = self.transport.device_info();
        info!(
            "Device: {} (vid {:?}, pid {:?})",
            info.driver_desc, info.vendor_id, info.product_id
        );
        if info.vendor_id.is_some() && !info.is_expected_bridge() {
            warn!("{} is not a CP210x bridge, continuing anyway", info.driver_desc);
        }

        self.transport.disconnect();
        self.transport.connect(settings)?;

        if !self.transport.is_connected() {
            anyhow::bail!("{} failed to connect", info.driver_desc);
        }

        info!(
            "{} initialized, {} limited to {} LEDs",
            info.driver_desc,
            CHANNEL_NAME,
            self.resolver.max_leds()
        );
        Ok(info)
    }

    /// Render one tick. Returns the number of packets written.
    pub fn render<C: LedChannel + ?Sized>(
        &mut self,
        settings: &RenderSettings,
        channel: &C,
    ) -> Result<usize, RenderError> {
        self.send_frame(settings, false, channel)
    }

    /// Send one shutdown-color frame, then close the link
    pub fn shutdown<C: LedChannel + ?Sized>(
        &mut self,
        settings: &RenderSettings,
        channel: &C,
    ) -> Result<usize, RenderError> {
        let result = self.send_frame(settings, true, channel);
        self.transport.disconnect();
        result
    }

    fn send_frame<C: LedChannel + ?Sized>(
        &mut self,
        settings: &RenderSettings,
        shutdown: bool,
        channel: &C,
    ) -> Result<usize, RenderError> {
        if !self.transport.is_connected() {
            return Err(RenderError::TransportUnavailable);
        }

        let frame = self.resolver.resolve(settings, shutdown, channel);
        let packets = self.framer.frame_from_flat(&frame.data)?;
        let total = packets.len();

        for (i, packet) in packets.iter().enumerate() {
            if log_enabled!(Level::Trace) {
                let hex: String = packet
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ");
                trace!("Packet {}/{} ({} bytes): {}", i + 1, total, packet.len(), hex);
            }

            self.transport
                .write(packet)
                .map_err(|source| RenderError::TransportWrite {
                    packet: i + 1,
                    total,
                    source,
                })?;

            (self.delay)(self.packet_delay);
        }

        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(total)
    }
}
