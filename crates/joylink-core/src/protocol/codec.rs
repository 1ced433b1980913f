//! Protocol codec
//!
//! Decodes inbound telemetry lines and encodes outbound commands.
//!
//! Inbound (device → host):
//! - `J,<x>,<y>,B,<mode>` — joystick position and mode
//!
//! Outbound (host → device):
//! - `L,<level>` — set LED brightness (0–255)
//! - `BLINK` — blink the LED once

use std::fmt;

use serde::{Deserialize, Serialize};

/// Field separator on the wire
const FIELD_SEPARATOR: char = ',';

/// Tag of the joystick report's first field
const JOYSTICK_TAG: &str = "J";

/// Tag of the joystick report's fourth field
const BUTTON_TAG: &str = "B";

/// A decoded inbound line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundFrame {
    /// Joystick position and mode report
    JoystickReport {
        /// Raw X axis reading
        x: i32,
        /// Raw Y axis reading
        y: i32,
        /// Mode toggled by the joystick button
        mode: i32,
    },
    /// Line that does not have the expected shape
    Unrecognized,
}

impl InboundFrame {
    /// Whether this frame carries device state
    pub fn is_recognized(&self) -> bool {
        !matches!(self, InboundFrame::Unrecognized)
    }
}

/// A command sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundCommand {
    /// Set LED brightness
    SetBrightness {
        /// Brightness level, 0 (off) to 255 (full)
        level: u8,
    },
    /// Blink the LED once
    Blink,
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundCommand::SetBrightness { level } => write!(f, "L,{}", level),
            OutboundCommand::Blink => f.write_str("BLINK"),
        }
    }
}

/// Decode one trimmed line
///
/// Requires at least five comma-separated fields shaped `J,<int>,<int>,B,<int>`.
/// Extra trailing fields are ignored. Anything else is `Unrecognized`.
pub fn decode(line: &str) -> InboundFrame {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() < 5 || fields[0] != JOYSTICK_TAG || fields[3] != BUTTON_TAG {
        return InboundFrame::Unrecognized;
    }

    match (
        fields[1].parse::<i32>(),
        fields[2].parse::<i32>(),
        fields[4].parse::<i32>(),
    ) {
        (Ok(x), Ok(y), Ok(mode)) => InboundFrame::JoystickReport { x, y, mode },
        _ => InboundFrame::Unrecognized,
    }
}

/// Encode a command as one newline-terminated wire line
pub fn encode(cmd: &OutboundCommand) -> Vec<u8> {
    format!("{}\n", cmd).into_bytes()
}

/// Map a horizontal pointer position to a brightness level
///
/// Linear over `0..width`, truncated toward zero and clamped to 0–255.
pub fn brightness_from_position(position: f64, width: f64) -> OutboundCommand {
    let level = if width > 0.0 && position.is_finite() {
        (position / width * 255.0).clamp(0.0, 255.0) as u8
    } else {
        0
    };
    OutboundCommand::SetBrightness { level }
}
