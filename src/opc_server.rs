use anyhow::{Context, Result};
use log::{debug, error, info, log_enabled, trace, Level};
use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::canvas::Canvas;
use crate::config::OpcConfig;

const RECV_BUFFER_SIZE: usize = 16384; // 16KB

/// OPC header: channel, command, 2 length bytes (big-endian)
const OPC_HEADER_LEN: usize = 4;
const OPC_SET_PIXELS: u8 = 0;
const OPC_BROADCAST: u8 = 0;

#[derive(Debug, PartialEq, Eq)]
struct OpcMessage {
    channel: u8,
    command: u8,
    data: Vec<u8>,
}

/// Pop one complete OPC message off the front of `buffer`
fn take_message(buffer: &mut Vec<u8>) -> Option<OpcMessage> {
    if buffer.len() < OPC_HEADER_LEN {
        return None;
    }

    let channel = buffer[0];
    let command = buffer[1];
    let length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;

    let message_size = OPC_HEADER_LEN + length;
    if buffer.len() < message_size {
        return None;
    }

    let data = buffer.drain(..message_size).skip(OPC_HEADER_LEN).collect();
    Some(OpcMessage {
        channel,
        command,
        data,
    })
}

/// Receives OPC pixel data over TCP and stores it in the canvas
pub struct OpcServer {
    config: OpcConfig,
    canvas: Canvas,
    frames_received: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl OpcServer {
    pub fn new(config: OpcConfig, canvas: Canvas, running: Arc<AtomicBool>) -> Self {
        OpcServer {
            config,
            canvas,
            frames_received: Arc::new(AtomicU64::new(0)),
            running,
        }
    }

    /// Get a clone of the frames received counter (for statistics)
    pub fn frames_received_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_received)
    }

    /// Accept clients one at a time until the running flag drops
    pub fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).context(format!("Failed to bind to {}", addr))?;

        // Set nonblocking so accept() can check running flag periodically
        listener.set_nonblocking(true)?;

        info!("OPC server listening on {}", addr);

        while self.running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, peer_addr)) => {
                    info!("Client connected from {}", peer_addr);

                    if let Err(e) = self.handle_client(stream) {
                        error!("Error handling client: {}", e);
                    }

                    info!("Client disconnected");
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        Ok(())
    }

    fn handle_client(&self, mut stream: TcpStream) -> Result<()> {
        stream
            .set_nonblocking(true)
            .context("Failed to set socket to non-blocking mode")?;

        let mut buffer = Vec::new();
        let mut read_buf = vec![0u8; RECV_BUFFER_SIZE];

        while self.running.load(Ordering::Relaxed) {
            // Drain everything the socket has right now
            loop {
                match stream.read(&mut read_buf) {
                    Ok(0) => return Ok(()),
                    Ok(n) => buffer.extend_from_slice(&read_buf[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            while let Some(message) = take_message(&mut buffer) {
                self.process_message(&message);
            }

            thread::sleep(Duration::from_millis(1));
        }

        Ok(())
    }

    fn accepts(&self, channel: u8) -> bool {
        self.config.channel == OPC_BROADCAST
            || channel == OPC_BROADCAST
            || channel == self.config.channel
    }

    fn process_message(&self, message: &OpcMessage) {
        if message.command != OPC_SET_PIXELS {
            debug!("Ignoring OPC command {}", message.command);
            return;
        }

        if !self.accepts(message.channel) {
            trace!("Ignoring OPC channel {}", message.channel);
            return;
        }

        if log_enabled!(Level::Trace) {
            let hex: String = message
                .data
                .iter()
                .take(30)
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            trace!(
                "Received: channel={}, pixel_count={}, first bytes: {}",
                message.channel,
                message.data.len() / 3,
                hex
            );
        }

        self.canvas.set_pixels(&message.data);
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }
}

/// Log receive and render rates every 5 seconds
pub fn spawn_stats_thread(
    frames_received: Arc<AtomicU64>,
    frames_rendered: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let mut last_received = 0u64;
        let mut last_rendered = 0u64;

        while running.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_secs(5));

            let received = frames_received.load(Ordering::Relaxed);
            let rendered = frames_rendered.load(Ordering::Relaxed);

            info!(
                "[Stats] Received: {:.1} fps, rendered: {:.1} fps",
                (received - last_received) as f64 / 5.0,
                (rendered - last_rendered) as f64 / 5.0
            );

            last_received = received;
            last_rendered = rendered;
        }
    });
}
