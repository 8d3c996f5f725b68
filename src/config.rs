//! Relay configuration: defaults, JSON config file, validation.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3479";
pub const DEFAULT_PATH: &str = "/signal";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the listener binds to
    pub bind_addr: String,
    /// Only upgrade requests on this path are accepted
    pub path: String,
    pub ping_interval_secs: u64,
    /// Disconnect when a ping stays unanswered this long
    pub pong_timeout_secs: u64,
    /// Per-connection outbound queue; messages beyond it are dropped for that peer
    pub outbound_buffer: usize,
    pub command_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            path: DEFAULT_PATH.to_string(),
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            outbound_buffer: 256,
            command_buffer: 1024,
        }
    }
}

impl RelayConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Apply command-line overrides on top of file or default values.
    pub fn with_overrides(mut self, bind_addr: Option<String>, path: Option<String>) -> Self {
        if let Some(bind_addr) = bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(path) = path {
            self.path = path;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "path must start with '/': {:?}",
                self.path
            )));
        }
        if self.ping_interval_secs == 0 || self.pong_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "keepalive intervals must be non-zero".to_string(),
            ));
        }
        // tokio channels panic on zero capacity
        if self.outbound_buffer == 0 || self.command_buffer == 0 {
            return Err(ConfigError::Invalid(
                "buffer sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.path, "/signal");
        assert_eq!(config.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.pong_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RelayConfig::from_json(r#"{"bind_addr": "127.0.0.1:9000"}"#).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.path, DEFAULT_PATH);
        assert_eq!(config.outbound_buffer, 256);
    }

    #[test]
    fn empty_object_is_default() {
        let config = RelayConfig::from_json("{}").unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn rejects_relative_path() {
        let err = RelayConfig::from_json(r#"{"path": "signal"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_buffer() {
        let err = RelayConfig::from_json(r#"{"outbound_buffer": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_ping_interval() {
        let err = RelayConfig::from_json(r#"{"ping_interval_secs": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = RelayConfig::from_json("{bind_addr").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RelayConfig::load(Path::new("/nonexistent/relay.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn flags_override_file_values() {
        let file = RelayConfig::from_json(r#"{"bind_addr": "127.0.0.1:9000", "path": "/rtc"}"#)
            .unwrap();
        let config = file.with_overrides(Some("0.0.0.0:7000".to_string()), None);
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.path, "/rtc");
        assert_eq!(config.ping_interval_secs, 30);
    }

    #[test]
    fn no_flags_keep_file_values() {
        let file = RelayConfig::from_json(r#"{"path": "/rtc", "outbound_buffer": 64}"#).unwrap();
        let config = file.clone().with_overrides(None, None);
        assert_eq!(config, file);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn flags_override_defaults() {
        let config = RelayConfig::default().with_overrides(None, Some("/signal/v2".to_string()));
        assert_eq!(config.path, "/signal/v2");
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_string(&RelayConfig::default()).unwrap();
        assert!(json.contains("\"path\":\"/signal\""));
        assert!(json.contains("3479"));
    }
}
