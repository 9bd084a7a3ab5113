//! Configuration for pf-status-relay
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. Default location: /etc/pf-status-relay/config.toml

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pf-status-relay/config.toml";

/// Overrides the configuration file location
pub const CONFIG_PATH_ENV: &str = "PF_STATUS_RELAY_CONFIG";

/// Comma-separated PF interface names
pub const INTERFACES_ENV: &str = "PF_STATUS_RELAY_INTERFACES";

/// LACP polling interval in milliseconds
pub const POLLING_INTERVAL_ENV: &str = "PF_STATUS_RELAY_POLLING_INTERVAL";

pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 1000;

pub const MIN_POLLING_INTERVAL_MS: u64 = 100;

/// Capacity of the link event queue between the subscription and the inspector
pub const QUEUE_CAPACITY: usize = 100;

/// Complete pf-status-relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// PF interface names to monitor
    #[serde(default)]
    pub interfaces: Vec<String>,

    /// LACP polling interval in milliseconds
    #[serde(default = "default_polling_interval")]
    pub polling_interval_ms: u64,
}

fn default_polling_interval() -> u64 {
    DEFAULT_POLLING_INTERVAL_MS
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interfaces: Vec::new(),
            polling_interval_ms: default_polling_interval(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                RelayError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RelayError::Io(e)),
        }
    }

    /// Load the file named by `PF_STATUS_RELAY_CONFIG` (or the default
    /// location), apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables looked up through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        // Empty values count as unset.
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(interfaces) = lookup(INTERFACES_ENV) {
            self.interfaces = parse_interfaces(&interfaces);
        }

        if let Some(interval) = lookup(POLLING_INTERVAL_ENV) {
            self.polling_interval_ms = interval.trim().parse().map_err(|e| {
                RelayError::Configuration(format!(
                    "invalid {} value {:?}: {}",
                    POLLING_INTERVAL_ENV, interval, e
                ))
            })?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.polling_interval_ms < MIN_POLLING_INTERVAL_MS {
            return Err(RelayError::Configuration(format!(
                "polling interval must be greater than {} - current value: {}",
                MIN_POLLING_INTERVAL_MS, self.polling_interval_ms
            )));
        }

        if self.interfaces.is_empty() {
            return Err(RelayError::Configuration(
                "interfaces must be set".to_string(),
            ));
        }

        Ok(())
    }

    /// Get polling interval as Duration
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

/// Split a comma-separated interface list, trimming names and dropping
/// empty entries.
pub fn parse_interfaces(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert!(config.interfaces.is_empty());
        assert_eq!(config.polling_interval_ms, 1000);
        assert_eq!(config.polling_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_interfaces() {
        assert_eq!(
            parse_interfaces(" ens1f0, ,ens1f1,,  "),
            vec!["ens1f0".to_string(), "ens1f1".to_string()]
        );
        assert!(parse_interfaces(" , ").is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RelayConfig::default();
        config
            .apply_env(env(&[
                (INTERFACES_ENV, "ens1f0,ens2f0"),
                (POLLING_INTERVAL_ENV, "250"),
            ]))
            .unwrap();
        assert_eq!(config.interfaces, vec!["ens1f0", "ens2f0"]);
        assert_eq!(config.polling_interval(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_env_values_keep_configured_values() {
        let mut config = RelayConfig {
            interfaces: vec!["ens1f0".to_string()],
            polling_interval_ms: 500,
        };
        config
            .apply_env(env(&[(INTERFACES_ENV, ""), (POLLING_INTERVAL_ENV, "  ")]))
            .unwrap();
        assert_eq!(config.interfaces, vec!["ens1f0"]);
        assert_eq!(config.polling_interval_ms, 500);

        let mut config = RelayConfig::default();
        config.apply_env(env(&[(POLLING_INTERVAL_ENV, "")])).unwrap();
        assert_eq!(config.polling_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_env_non_integer_interval() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_env(env(&[(POLLING_INTERVAL_ENV, "fast")]))
            .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_validate_interval_too_small() {
        let config = RelayConfig {
            interfaces: vec!["ens1f0".to_string()],
            polling_interval_ms: 50,
        };
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "Configuration error: polling interval must be greater than 100 - current value: 50"
        );
    }

    #[test]
    fn test_validate_minimum_interval_accepted() {
        let config = RelayConfig {
            interfaces: vec!["ens1f0".to_string()],
            polling_interval_ms: 100,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_no_interfaces() {
        let mut config = RelayConfig::default();
        config.apply_env(env(&[(INTERFACES_ENV, " , ")])).unwrap();
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "Configuration error: interfaces must be set"
        );
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
interfaces = ["ens1f0", "ens1f1"]
"#;
        let config: RelayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.interfaces.len(), 2);
        // Unspecified values should use defaults
        assert_eq!(config.polling_interval_ms, 1000);
    }

    #[test]
    fn test_load_from_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "interfaces = [\"ens1f0\"]\npolling_interval_ms = 500").unwrap();

        let mut config = RelayConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.interfaces, vec!["ens1f0"]);
        assert_eq!(config.polling_interval_ms, 500);

        config.apply_env(env(&[(INTERFACES_ENV, "ens3f0")])).unwrap();
        assert_eq!(config.interfaces, vec!["ens3f0"]);
        assert_eq!(config.polling_interval_ms, 500);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "polling_interval_ms = \"soon\"").unwrap();
        assert!(matches!(
            RelayConfig::load_or_default(file.path()),
            Err(RelayError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = RelayConfig::load_or_default("/nonexistent/path.toml").unwrap();
        assert_eq!(config, RelayConfig::default());
    }
}
