use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tpm2_serial::canvas::Canvas;
use tpm2_serial::config::Config;
use tpm2_serial::opc_server::{self, OpcServer};
use tpm2_serial::protocol::PacketFramer;
use tpm2_serial::renderer::{RenderError, Renderer};
use tpm2_serial::resolver::FrameResolver;
use tpm2_serial::transport::SerialTransport;

/// How long to wait between attempts to reopen a lost serial port
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tpm2_serial")]
#[command(about = "Drives an ESP32 LED controller over serial using TPM2 framing\n\nReceives OPC data over TCP and renders it to the strip.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: String,

    /// Enable debug output (statistics)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps every packet)
    #[arg(long)]
    ddebug: bool,
}

fn init_logging(cli: &Cli) {
    let level = if cli.ddebug {
        LevelFilter::Trace
    } else if cli.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // RUST_LOG still wins over the flags
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = Config::load(&cli.config)?;
    let device = &config.device;
    let settings = device.render_settings();

    let canvas = Canvas::new(device.led_count, device.pulse_color, device.pulse_timeout());

    let mut renderer = Renderer::new(
        FrameResolver::new(device.max_leds),
        PacketFramer::new(device.max_leds_per_packet),
        SerialTransport::new(&config.output.port),
        device.packet_delay(),
    );
    renderer.initialize(&config.output.serial)?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutting down...");
        handler_flag.store(false, Ordering::Relaxed);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let server = OpcServer::new(config.opc.clone(), canvas.clone(), Arc::clone(&running));
    if cli.debug || cli.ddebug {
        opc_server::spawn_stats_thread(
            server.frames_received_counter(),
            renderer.frames_sent_counter(),
            Arc::clone(&running),
        );
    }

    let server_flag = Arc::clone(&running);
    let server_handle = thread::spawn(move || {
        if let Err(e) = server.run() {
            error!("OPC server stopped: {:#}", e);
            server_flag.store(false, Ordering::Relaxed);
        }
    });

    let interval = device.frame_interval();
    let mut last_reconnect = Instant::now();

    while running.load(Ordering::Relaxed) {
        let tick = Instant::now();

        match renderer.render(&settings, &canvas) {
            Ok(packets) => debug!("Frame sent in {} packet(s)", packets),
            Err(RenderError::TransportUnavailable) => {
                if last_reconnect.elapsed() >= RECONNECT_INTERVAL {
                    last_reconnect = Instant::now();
                    if let Err(e) = renderer.initialize(&config.output.serial) {
                        debug!("Reconnect failed: {:#}", e);
                    }
                }
            }
            Err(e) => error!("Frame dropped: {:#}", anyhow::Error::from(e)),
        }

        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            thread::sleep(rest);
        }
    }

    // Light the strip with the shutdown color before closing the port
    info!("Turning off LEDs...");
    if let Err(e) = renderer.shutdown(&settings, &canvas) {
        warn!("Shutdown frame not sent: {}", e);
    }

    let _ = server_handle.join();
    info!("Stopped");

    Ok(())
}
