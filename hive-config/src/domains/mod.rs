//! Domain-specific configuration modules

pub mod cluster;
pub mod kv;
pub mod logging;
pub mod server;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Hive configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HiveConfig {
    /// Cluster membership and heartbeat configuration
    #[serde(default)]
    pub cluster: cluster::ClusterConfig,

    /// Coordination store (etcd) configuration
    #[serde(default)]
    pub kv: kv::KvConfig,

    /// HTTP API server configuration
    #[serde(default)]
    pub server: server::ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl HiveConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.cluster.validate()?;
        self.kv.validate()?;
        self.server.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// The URL peers use to reach this daemon's API
    pub fn daemon_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.cluster.advertise_host, self.server.port
        )
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = HiveConfig::default();
        serde_yaml::to_string(&config).unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = HiveConfig::default();
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_daemon_url() {
        let config = HiveConfig::default();
        assert_eq!(config.daemon_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_sample_roundtrip() {
        let sample = HiveConfig::generate_sample();
        let parsed: HiveConfig = serde_yaml::from_str(&sample).unwrap();
        assert!(parsed.validate_all().is_ok());
    }
}
