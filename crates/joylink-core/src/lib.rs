//! # Joylink Core Library
//!
//! Host-side protocol engine for a joystick/LED peripheral on a serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Chunk-to-line reassembly for the newline-delimited wire protocol
//! - Decoding of joystick reports and encoding of LED commands
//! - A shared, poll-only view of the latest device state
//! - Serial session lifecycle (connect, read loop, disconnect, failure)
//! - A serialized command path for concurrent callers
//!
//! ## Example
//!
//! ```rust,ignore
//! use joylink_core::protocol::{OutboundCommand, SerialPortProvider, SerialSession, SessionConfig};
//!
//! let session = SerialSession::new(SerialPortProvider::new(), SessionConfig::default());
//! session.connect().await?;
//!
//! // Poll at your own cadence
//! let state = session.state().snapshot();
//! println!("x={} y={} mode={}", state.joystick_x, state.joystick_y, state.mode);
//!
//! session.commands().send(OutboundCommand::Blink);
//! ```

pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        CommandChannel, ConnectionState, ConnectionStatus, DeviceState, InboundFrame,
        LineFramer, OutboundCommand, ProtocolError, SerialPortProvider, SerialSession,
        SessionConfig, TransportProvider,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
