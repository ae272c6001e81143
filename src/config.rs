//! YAML configuration loading.
//!
//! ```yaml
//! collector:
//!   host: 127.0.0.1
//!   port: 5000
//!   delay_after_init_and_peer_ups: 5
//! router_data:
//!   master_directory_path: /var/lib/mrt2bmp/master
//!   processed_directory_path: /var/lib/mrt2bmp/processed
//!   ignore_timestamp_interval_abnormality: false
//!   timestamp_interval_limit: 20
//!   max_queue_size: 10000
//! logging:
//!   level: info
//! ```

use crate::error::ReplayError;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub collector: CollectorConfig,
    pub router_data: RouterDataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collector endpoint and session pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds to wait between the Peer-Up burst and the first Route
    /// Monitoring message, giving the collector time to register peers.
    #[serde(default = "default_delay")]
    pub delay_after_init_and_peer_ups: u64,
}

/// Staging directories and replay limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterDataConfig {
    pub master_directory_path: PathBuf,
    pub processed_directory_path: PathBuf,
    /// Stage files across an abnormal timestamp gap instead of withholding
    /// them.
    #[serde(default)]
    pub ignore_timestamp_interval_abnormality: bool,
    /// Maximum permitted gap in minutes between consecutive UPDATES files.
    #[serde(default = "default_interval_limit")]
    pub timestamp_interval_limit: i64,
    /// Capacity of the encoder-to-writer queue; producers block when full.
    #[serde(default = "default_queue_size")]
    pub max_queue_size: usize,
    /// Translate BGP4MP state changes leaving Established into BMP
    /// Peer-Down notifications.
    #[serde(default = "default_true")]
    pub emit_peer_down: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level, plus optional per-module overrides in env_logger
    /// filter syntax, e.g. `info,mrt2bmp::sync=debug`.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_level(),
        }
    }
}

fn default_port() -> u16 {
    5000
}

fn default_delay() -> u64 {
    5
}

fn default_interval_limit() -> i64 {
    20
}

fn default_queue_size() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ReplayError> {
        let file = File::open(path).map_err(|e| {
            ReplayError::Config(format!("cannot open config file {}: {e}", path.display()))
        })?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ReplayError> {
        if self.collector.host.is_empty() {
            return Err(ReplayError::Config("collector.host must not be empty".to_string()));
        }
        if self.router_data.max_queue_size == 0 {
            return Err(ReplayError::Config(
                "router_data.max_queue_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_with_defaults() {
        let file = write_config(
            r#"
collector:
  host: 127.0.0.1
router_data:
  master_directory_path: /tmp/master
  processed_directory_path: /tmp/processed
"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.collector.host, "127.0.0.1");
        assert_eq!(config.collector.port, 5000);
        assert_eq!(config.collector.delay_after_init_and_peer_ups, 5);
        assert!(!config.router_data.ignore_timestamp_interval_abnormality);
        assert_eq!(config.router_data.timestamp_interval_limit, 20);
        assert_eq!(config.router_data.max_queue_size, 10_000);
        assert!(config.router_data.emit_peer_down);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_collector_section() {
        let file = write_config(
            r#"
router_data:
  master_directory_path: /tmp/master
  processed_directory_path: /tmp/processed
"#,
        );
        assert!(matches!(
            Config::load(file.path()),
            Err(ReplayError::Config(_))
        ));
    }

    #[test]
    fn test_missing_host() {
        let file = write_config(
            r#"
collector:
  port: 5000
router_data:
  master_directory_path: /tmp/master
  processed_directory_path: /tmp/processed
"#,
        );
        assert!(matches!(
            Config::load(file.path()),
            Err(ReplayError::Config(_))
        ));
    }

    #[test]
    fn test_full_config() {
        let file = write_config(
            r#"
collector:
  host: collector.example.net
  port: 1790
  delay_after_init_and_peer_ups: 1
router_data:
  master_directory_path: /tmp/master
  processed_directory_path: /tmp/processed
  ignore_timestamp_interval_abnormality: true
  timestamp_interval_limit: 45
  max_queue_size: 64
  emit_peer_down: false
logging:
  level: debug
"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.collector.port, 1790);
        assert!(config.router_data.ignore_timestamp_interval_abnormality);
        assert_eq!(config.router_data.timestamp_interval_limit, 45);
        assert_eq!(config.router_data.max_queue_size, 64);
        assert!(!config.router_data.emit_peer_down);
        assert_eq!(config.logging.level, "debug");
    }
}
