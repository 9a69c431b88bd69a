//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OvationConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub extensions: ExtensionsConfig,

    #[serde(default)]
    pub automation: AutomationConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Management server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Socket address string the server binds.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL handed to extensions for the URL helper.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

/// Extension runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    /// Directory scanned for extension manifests.
    #[serde(default = "default_extensions_dir")]
    pub dir: PathBuf,

    /// Parent of per-extension data directories, the settings file, and
    /// the extension state file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Discover and load extensions on startup.
    #[serde(default = "default_true")]
    pub auto_load: bool,

    /// Reload count per extension past which a restart is recommended.
    #[serde(default = "default_max_reloads")]
    pub max_reloads: u32,

    /// Per-extension log ring capacity.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            dir: default_extensions_dir(),
            data_dir: default_data_dir(),
            auto_load: true,
            max_reloads: default_max_reloads(),
            log_capacity: default_log_capacity(),
        }
    }
}

fn default_extensions_dir() -> PathBuf {
    PathBuf::from("extensions")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

fn default_max_reloads() -> u32 {
    20
}

fn default_log_capacity() -> usize {
    250
}

/// Automation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Execution history ring capacity.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    200
}

/// Event pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Bounded capacity of the source→dispatch channel; a bursty source
    /// backpressures instead of buffering unboundedly.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file path; required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file/line locations in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module level overrides, e.g. `{"ovation_flow": "debug"}`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = OvationConfig::default();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.server.addr(), "127.0.0.1:8090");
        assert!(config.extensions.auto_load);
        assert_eq!(config.automation.history_limit, 200);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: OvationConfig = serde_json::from_value(serde_json::json!({
            "server": {"port": 9000},
            "logging": {"level": "debug"},
        }))
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }
}
