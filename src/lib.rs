//! Drive an ESP32 addressable-LED controller over serial with TPM2 framing.
//!
//! Each render tick resolves the colors of the device's single channel
//! ([`resolver`]), splits them into TPM2 data packets ([`protocol`]) and
//! writes the packets to the serial port ([`renderer`], [`transport`]).

pub mod canvas;
pub mod color;
pub mod config;
pub mod device;
pub mod opc_server;
pub mod pixel_format;
pub mod protocol;
pub mod renderer;
pub mod resolver;
pub mod transport;
