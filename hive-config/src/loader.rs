//! Configuration loading and environment variable handling

use crate::domains::HiveConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "HIVE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<HiveConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: HiveConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<HiveConfig> {
        let mut config = HiveConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<HiveConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut HiveConfig) -> ConfigResult<()> {
        if let Ok(name) = self.get_env_var("CLUSTER_NAME") {
            config.cluster.name = name;
        }

        if let Ok(member) = self.get_env_var("MEMBER_NAME") {
            config.cluster.member_name = member;
        }

        if let Ok(host) = self.get_env_var("ADVERTISE_HOST") {
            config.cluster.advertise_host = host;
        }

        if let Ok(dir) = self.get_env_var("DATA_DIR") {
            config.cluster.data_dir = dir;
        }

        if let Ok(endpoints) = self.get_env_var("KV_ENDPOINTS") {
            config.kv.endpoints = endpoints.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(bind) = self.get_env_var("SERVER_BIND_ADDRESS") {
            config.server.bind_address = bind;
        }

        if let Ok(port) = self.get_env_var("SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SERVER_PORT: {}", e)))?;
        }

        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = log_level
                .parse()
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
