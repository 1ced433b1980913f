//! Serial Protocol Communication
//!
//! Implements the newline-delimited text protocol spoken by the joystick/LED
//! peripheral.
//!
//! Inbound lines are `J,<x>,<y>,B,<mode>`; outbound lines are `L,<level>` and
//! `BLINK`.

pub mod codec;
mod command;
mod config;
mod error;
pub mod framer;
pub mod serial;
mod session;
mod state;
pub mod transport;

pub use codec::{brightness_from_position, decode, encode, InboundFrame, OutboundCommand};
pub use command::CommandChannel;
pub use config::SessionConfig;
pub use error::ProtocolError;
pub use framer::{FramedLines, LineFramer};
pub use serial::{list_ports, PortInfo};
pub use session::SerialSession;
pub use state::{ConnectionState, ConnectionStatus, DeviceState, LinkStats};
pub use transport::{SerialPortProvider, TransportProvider};

/// Fixed baud rate of the peripheral firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default number of bytes requested per transport read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64;

/// Longest line accepted before it is discarded as noise
pub const MAX_LINE_LENGTH: usize = 4096;

/// How long `disconnect` waits for an in-flight write before abandoning it
pub const DEFAULT_WRITE_DRAIN_TIMEOUT_MS: u64 = 500;
