//! Engine configuration.
//!
//! This module provides serialization and deserialization of the engine's
//! tunables, allowing applications to persist and restore them.

use serde::{Deserialize, Serialize};

/// Log level setting for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get the display name for this log level.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Engine tunables, serializable for persistence alongside application
/// settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Version of the configuration file format
    #[serde(default = "default_version")]
    pub version: u32,

    /// Upper bound on bytes held by one block cache
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: usize,

    /// Rows materialized per cache unit
    #[serde(default = "default_rows_per_unit")]
    pub rows_per_unit: usize,

    /// Budget for fully in-memory elements; imports above this must use an
    /// on-disk processing location
    #[serde(default = "default_memory_budget_bytes")]
    pub memory_budget_bytes: usize,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_cache_capacity_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_rows_per_unit() -> usize {
    64
}

fn default_memory_budget_bytes() -> usize {
    1024 * 1024 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            cache_capacity_bytes: default_cache_capacity_bytes(),
            rows_per_unit: default_rows_per_unit(),
            memory_budget_bytes: default_memory_budget_bytes(),
            log_level: LogLevel::default(),
        }
    }
}

impl EngineConfig {
    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.cache_capacity_bytes > 0);
        assert!(config.rows_per_unit > 0);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = EngineConfig::default();
        config.rows_per_unit = 16;
        config.log_level = LogLevel::Debug;

        let json = config.to_json().unwrap();
        let restored = EngineConfig::from_json(&json).unwrap();
        assert_eq!(restored.rows_per_unit, 16);
        assert_eq!(restored.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let restored = EngineConfig::from_json("{\"rows_per_unit\": 8}").unwrap();
        assert_eq!(restored.rows_per_unit, 8);
        assert_eq!(
            restored.cache_capacity_bytes,
            EngineConfig::default().cache_capacity_bytes
        );
    }
}
