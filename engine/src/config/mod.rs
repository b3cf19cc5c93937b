//! Configuration management
//!
//! This module handles loading, validation, and management of the Shipwright
//! configuration. Configuration is stored in TOML format at
//! ~/.shipwright/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level and debug mode
//! - **orchestrator**: Step parallelism and log query defaults
//! - **executor**: Simulated-time compression
//! - **telemetry**: Event buffer size
//!
//! Review and validation pass thresholds are fixed constants in the SDK and
//! are intentionally not configurable.
//!
//! # Examples
//!
//! ```no_run
//! use shipwright_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Parallel steps: {}", config.orchestrator.max_parallel_steps);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Core settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Include internal error detail in transport envelopes
    #[serde(default)]
    pub debug: bool,
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum steps in flight at once; 1 runs strictly in order
    #[serde(default = "default_max_parallel_steps")]
    pub max_parallel_steps: usize,

    /// Number of log entries returned when the caller gives no limit
    #[serde(default = "default_log_limit")]
    pub default_log_limit: usize,
}

/// Simulated executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Wall-clock milliseconds spent per estimated minute of work (0 = instant)
    #[serde(default)]
    pub millis_per_minute: u64,

    /// Upper bound on the simulated delay of a single step
    #[serde(default = "default_max_step_delay")]
    pub max_step_delay_ms: u64,
}

/// Telemetry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Events kept in memory for log queries
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_parallel_steps() -> usize {
    1
}

fn default_log_limit() -> usize {
    50
}

fn default_max_step_delay() -> u64 {
    2000
}

fn default_buffer_capacity() -> usize {
    1000
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            debug: false,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_steps: default_max_parallel_steps(),
            default_log_limit: default_log_limit(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            millis_per_minute: 0,
            max_step_delay_ms: default_max_step_delay(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.shipwright/config.toml)
    ///
    /// If the configuration file doesn't exist, writes and returns the default
    /// configuration.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.shipwright/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".shipwright").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.orchestrator.max_parallel_steps == 0 {
            return Err(EngineError::Config(
                "max_parallel_steps must be at least 1".to_string(),
            ));
        }

        if self.orchestrator.default_log_limit == 0 {
            return Err(EngineError::Config(
                "default_log_limit must be at least 1".to_string(),
            ));
        }

        if self.telemetry.buffer_capacity == 0 {
            return Err(EngineError::Config(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert!(!config.core.debug);
        assert_eq!(config.orchestrator.max_parallel_steps, 1);
        assert_eq!(config.orchestrator.default_log_limit, 50);
        assert_eq!(config.executor.millis_per_minute, 0);
        assert_eq!(config.telemetry.buffer_capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
[orchestrator]
max_parallel_steps = 4
"#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.max_parallel_steps, 4);
        assert_eq!(config.orchestrator.default_log_limit, 50);
        assert_eq!(config.core.log_level, "info");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let err = Config::from_toml("[core]\nlog_level = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        assert!(Config::from_toml("[orchestrator]\nmax_parallel_steps = 0\n").is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.executor.millis_per_minute = 5;
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config, deserialized);
    }
}
