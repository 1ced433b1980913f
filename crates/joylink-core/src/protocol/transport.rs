//! Transport abstraction
//!
//! The session only needs three things from the host platform: whether a
//! serial transport exists at all, a way to pick a device, and a way to open
//! it at a fixed rate. The opened port is split into independent read and
//! write halves by the session.

use std::fmt;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialStream;
use tracing::{debug, warn};

use super::serial::{list_ports, open_port};
use super::{ProtocolError, SessionConfig};

/// Host platform capability for serial devices
pub trait TransportProvider: Send + Sync + 'static {
    /// Handle identifying a selected device
    type Device: fmt::Debug + Send;
    /// Opened duplex byte stream
    type Port: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Whether the host can provide a serial transport at all
    fn is_supported(&self) -> bool;

    /// Select a device. Fails with `ConnectionAborted` when selection is cancelled.
    fn request_device(
        &self,
    ) -> impl Future<Output = Result<Self::Device, ProtocolError>> + Send;

    /// Open the device at the given baud rate
    fn open(
        &self,
        device: Self::Device,
        baud_rate: u32,
    ) -> impl Future<Output = Result<Self::Port, ProtocolError>> + Send;
}

/// Native serial ports via `tokio-serial`
#[derive(Debug, Clone, Default)]
pub struct SerialPortProvider {
    port_name: Option<String>,
}

impl SerialPortProvider {
    /// Provider that selects the first discovered port, preferring known boards
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that always selects `port_name`
    pub fn with_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: Some(port_name.into()),
        }
    }

    /// Provider honouring the configured port name, if any
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            port_name: config.port_name.clone(),
        }
    }
}

impl TransportProvider for SerialPortProvider {
    type Device = String;
    type Port = SerialStream;

    fn is_supported(&self) -> bool {
        cfg!(any(unix, windows))
    }

    async fn request_device(&self) -> Result<String, ProtocolError> {
        if let Some(name) = &self.port_name {
            return Ok(name.clone());
        }

        let ports = tokio::task::spawn_blocking(list_ports)
            .await
            .map_err(|e| ProtocolError::OpenFailure(format!("port discovery failed: {e}")))?;

        // Ports come back with known boards first
        match ports.into_iter().next() {
            Some(port) => {
                debug!(
                    usb_id = ?port.usb_id(),
                    vendor = port.known_vendor().unwrap_or("unknown"),
                    "selected port {}",
                    port.name
                );
                Ok(port.name)
            }
            None => {
                warn!("no serial ports found");
                Err(ProtocolError::ConnectionAborted)
            }
        }
    }

    async fn open(&self, device: String, baud_rate: u32) -> Result<SerialStream, ProtocolError> {
        open_port(&device, baud_rate)
    }
}
