//! Soak harness configuration loading from file and environment variables.

use ntevent_core::StorageConfig;
use serde::Deserialize;
use thiserror::Error;

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Settings passed through to the listener storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Workload shape.
    #[serde(default)]
    pub soak: SoakConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workload driven against the storage.
#[derive(Debug, Clone, Deserialize)]
pub struct SoakConfig {
    /// Instance id of the storage under test.
    #[serde(default)]
    pub instance: u8,

    /// Number of concurrent notifier threads.
    #[serde(default = "default_producers")]
    pub producers: usize,

    /// Value notifications sent by each notifier.
    #[serde(default = "default_events_per_producer")]
    pub events_per_producer: u64,

    /// How long to wait for callback delivery to drain, in milliseconds.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "ntevent_core=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_producers() -> usize {
    4
}

fn default_events_per_producer() -> u64 {
    10_000
}

fn default_flush_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            instance: 0,
            producers: default_producers(),
            events_per_producer: default_events_per_producer(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `NTEVENT_LOG_LEVEL` overrides `logging.level`
/// - `NTEVENT_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `NTEVENT_INSTANCE` overrides `soak.instance`
/// - `NTEVENT_PRODUCERS` overrides `soak.producers`
/// - `NTEVENT_EVENTS_PER_PRODUCER` overrides `soak.events_per_producer`
/// - `NTEVENT_FLUSH_TIMEOUT_MS` overrides `soak.flush_timeout_ms`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(level) = std::env::var("NTEVENT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("NTEVENT_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(instance) = std::env::var("NTEVENT_INSTANCE") {
        if let Ok(parsed) = instance.parse() {
            config.soak.instance = parsed;
        }
    }
    if let Ok(producers) = std::env::var("NTEVENT_PRODUCERS") {
        if let Ok(parsed) = producers.parse() {
            config.soak.producers = parsed;
        }
    }
    if let Ok(count) = std::env::var("NTEVENT_EVENTS_PER_PRODUCER") {
        if let Ok(parsed) = count.parse() {
            config.soak.events_per_producer = parsed;
        }
    }
    if let Ok(timeout) = std::env::var("NTEVENT_FLUSH_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.soak.flush_timeout_ms = parsed;
        }
    }

    Ok(config)
}
