//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
///
/// Malformed inbound lines are deliberately absent: they decode to
/// [`InboundFrame::Unrecognized`](super::InboundFrame::Unrecognized) and are dropped.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial transport is not supported in this environment")]
    UnsupportedTransport,

    #[error("Connection aborted: no device selected")]
    ConnectionAborted,

    #[error("Failed to open serial port: {0}")]
    OpenFailure(String),

    #[error("Serial read failed: {0}")]
    ReadFailure(String),

    #[error("Serial write failed: {0}")]
    WriteFailure(String),

    #[error("Not connected to device")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the session ends up in `Failed` (rather than `Disconnected`) after this error
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            ProtocolError::ReadFailure(_) | ProtocolError::WriteFailure(_)
        )
    }
}
