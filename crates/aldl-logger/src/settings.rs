//! Logger configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `ALDL_*`
//! environment variables (`ALDL_SERIAL__DEVICE=/dev/ttyUSB1`).

use crate::LoggerError;
use aldl_acquire::AcquireConfig;
use aldl_protocol::{CommConfig, SerialConfig};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use record_buffer::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_NAME: &str = "aldl-logger";

/// How records are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per record
    Json,
    /// One line of hex per record
    Hex,
}

/// Complete logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Maximum tracing level
    pub log_level: String,
    /// Talk to the simulated ECM instead of a serial port
    pub mock: bool,
    /// Simulated exchange time in milliseconds
    pub mock_latency_ms: u64,
    pub serial: SerialConfig,
    pub comm: CommConfig,
    pub acquire: AcquireConfig,
    pub retention: RetentionPolicy,
    pub output: OutputFormat,
    /// Prometheus listen address, e.g. "127.0.0.1:9100"
    pub metrics_addr: Option<String>,
    /// Seconds between statistics log lines
    pub stats_interval_secs: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mock: false,
            mock_latency_ms: 10,
            serial: SerialConfig::default(),
            comm: CommConfig::default(),
            acquire: AcquireConfig::default(),
            retention: RetentionPolicy::default(),
            output: OutputFormat::Json,
            metrics_addr: None,
            stats_interval_secs: 10,
        }
    }
}

impl LoggerConfig {
    /// Load from `path` (required) or the default file (optional), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, LoggerError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("ALDL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::build(builder)
    }

    /// Parse a TOML document on its own
    pub fn from_toml(text: &str) -> Result<Self, LoggerError> {
        Self::build(Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, LoggerError> {
        Ok(builder.build()?.try_deserialize()?)
    }
}
