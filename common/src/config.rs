// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
    pub engine: EngineSettings,
    pub observability: ObservabilityConfig,
}

/// Bind address for the management API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Declared schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Path of the schedule file compiled at startup. When unset, the
    /// scheduler starts with no declared schedule; jobs still register.
    #[serde(default)]
    pub system_file: Option<String>,
}

/// In-memory engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    pub misfire_threshold_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.engine.tick_interval_ms == 0 {
            return Err("Engine tick_interval_ms must be greater than 0".to_string());
        }
        if self.engine.misfire_threshold_seconds == 0 {
            return Err("Engine misfire_threshold_seconds must be greater than 0".to_string());
        }

        if let Some(path) = &self.schedule.system_file {
            if path.trim().is_empty() {
                return Err("Schedule system_file cannot be blank when set".to_string());
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            schedule: ScheduleConfig { system_file: None },
            engine: EngineSettings {
                tick_interval_ms: 1000,
                misfire_threshold_seconds: 60,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
        }
    }
}
