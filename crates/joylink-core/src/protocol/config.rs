//! Session configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{
    ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_READ_CHUNK_SIZE, DEFAULT_WRITE_DRAIN_TIMEOUT_MS,
    MAX_LINE_LENGTH,
};

/// Serial session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port name. `None` selects the first discovered port.
    pub port_name: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Bytes requested per transport read
    pub read_chunk_size: usize,
    /// Lines longer than this are discarded
    pub max_line_len: usize,
    /// Milliseconds `disconnect` waits for a write in progress before abandoning it
    pub write_drain_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_line_len: MAX_LINE_LENGTH,
            write_drain_timeout_ms: DEFAULT_WRITE_DRAIN_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Config for a specific port with all other settings at their defaults
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: Some(port_name.into()),
            ..Self::default()
        }
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.baud_rate == 0 {
            return Err(ProtocolError::Config("baud_rate must be non-zero".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(ProtocolError::Config(
                "read_chunk_size must be non-zero".into(),
            ));
        }
        if self.max_line_len == 0 {
            return Err(ProtocolError::Config("max_line_len must be non-zero".into()));
        }
        if self.write_drain_timeout_ms == 0 {
            return Err(ProtocolError::Config(
                "write_drain_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn write_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.write_drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.port_name, None);
        assert_eq!(config.write_drain_timeout(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port_name": "/dev/ttyACM0", "read_chunk_size": 16 }}"#).unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.port_name.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.read_chunk_size, 16);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            SessionConfig::load(file.path()),
            Err(ProtocolError::Config(_))
        ));
    }

    #[test]
    fn test_validate_zero_chunk() {
        let config = SessionConfig {
            read_chunk_size: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ProtocolError::Config(_))));
    }

    #[test]
    fn test_validate_zero_drain_timeout() {
        let config = SessionConfig {
            write_drain_timeout_ms: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ProtocolError::Config(_))));
    }
}
