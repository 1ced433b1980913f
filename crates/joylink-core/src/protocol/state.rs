//! Shared connection state
//!
//! The single synchronization point between the read loop, the command path
//! and any number of observers polling for the latest device state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use super::{InboundFrame, ProtocolError};

/// Joystick reading at rest
const JOYSTICK_CENTER: i32 = 512;

/// Latest decoded state of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Raw X axis reading, conventionally 0–1023
    pub joystick_x: i32,
    /// Raw Y axis reading, conventionally 0–1023
    pub joystick_y: i32,
    /// Mode toggled by the joystick button, conventionally 0 or 1
    pub mode: i32,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            joystick_x: JOYSTICK_CENTER,
            joystick_y: JOYSTICK_CENTER,
            mode: 0,
        }
    }
}

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Not connected
    Disconnected,
    /// Device selection or port open in progress
    Connecting,
    /// Connected and reading
    Connected,
    /// Link failed on a read or write
    Failed,
}

/// Cumulative link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Bytes received from the transport
    pub rx_bytes: u64,
    /// Bytes written to the transport
    pub tx_bytes: u64,
    /// Joystick reports applied to the device state
    pub frames_applied: u64,
    /// Lines dropped as unrecognized
    pub lines_dropped: u64,
    /// Commands fully written
    pub commands_written: u64,
}

#[derive(Debug)]
struct Shared {
    device: DeviceState,
    status: ConnectionStatus,
}

/// Device state and connection status behind one lock
#[derive(Debug)]
pub struct ConnectionState {
    shared: RwLock<Shared>,
    last_error: Mutex<Option<String>>,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    frames_applied: AtomicU64,
    lines_dropped: AtomicU64,
    commands_written: AtomicU64,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    /// Create a disconnected state with a centered joystick
    pub fn new() -> Self {
        Self {
            shared: RwLock::new(Shared {
                device: DeviceState::default(),
                status: ConnectionStatus::Disconnected,
            }),
            last_error: Mutex::new(None),
            rx_bytes: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
            frames_applied: AtomicU64::new(0),
            lines_dropped: AtomicU64::new(0),
            commands_written: AtomicU64::new(0),
        }
    }

    /// Apply a decoded frame
    ///
    /// A joystick report replaces all three fields at once. `Unrecognized`
    /// leaves the device state untouched.
    pub fn update_from_frame(&self, frame: &InboundFrame) {
        match *frame {
            InboundFrame::JoystickReport { x, y, mode } => {
                let mut shared = self.shared.write().unwrap_or_else(PoisonError::into_inner);
                shared.device = DeviceState {
                    joystick_x: x,
                    joystick_y: y,
                    mode,
                };
                self.frames_applied.fetch_add(1, Ordering::Relaxed);
            }
            InboundFrame::Unrecognized => {
                self.lines_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Point-in-time copy of the device state
    pub fn snapshot(&self) -> DeviceState {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .device
    }

    /// Get current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// Set the connection status unconditionally
    pub fn set_status(&self, status: ConnectionStatus) {
        self.shared
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .status = status;
    }

    /// Move from `from` to `to`, returning false if the status was something else
    pub fn transition(&self, from: ConnectionStatus, to: ConnectionStatus) -> bool {
        let mut shared = self.shared.write().unwrap_or_else(PoisonError::into_inner);
        if shared.status != from {
            return false;
        }
        shared.status = to;
        true
    }

    /// Message of the most recent transport failure
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn record_error(&self, message: impl Into<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Record a failure that ended the link and leave `Connected`
    ///
    /// Read and write failures land in `Failed`; anything else in
    /// `Disconnected`. A status that already moved on is left alone.
    pub(crate) fn fail_link(&self, err: &ProtocolError) -> ConnectionStatus {
        self.record_error(err.to_string());
        let to = if err.is_link_failure() {
            ConnectionStatus::Failed
        } else {
            ConnectionStatus::Disconnected
        };
        self.transition(ConnectionStatus::Connected, to);
        self.status()
    }

    pub(crate) fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn record_rx(&self, bytes: usize) {
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_tx(&self, bytes: usize) {
        self.tx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.commands_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cumulative link counters
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            frames_applied: self.frames_applied.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            commands_written: self.commands_written.load(Ordering::Relaxed),
        }
    }
}
