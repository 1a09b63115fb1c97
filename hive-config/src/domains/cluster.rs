//! Cluster membership and heartbeat configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster name (namespaces all coordination keys)
    #[serde(default = "default_cluster_name")]
    pub name: String,

    /// Human-readable name for this member
    #[serde(default = "default_member_name")]
    pub member_name: String,

    /// Host name or IP that peers use to reach this daemon
    #[serde(default = "default_advertise_host")]
    pub advertise_host: String,

    /// Local data directory (holds the persisted member id)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// How often this member writes its heartbeat
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// How often this member scans peer heartbeats and re-checks leadership
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_check_heartbeat_interval"
    )]
    pub check_heartbeat_interval: Duration,

    /// How stale a peer heartbeat may be before the peer is marked not-alive
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_alive_threshold")]
    pub alive_threshold: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            member_name: default_member_name(),
            advertise_host: default_advertise_host(),
            data_dir: default_data_dir(),
            heartbeat_interval: default_heartbeat_interval(),
            check_heartbeat_interval: default_check_heartbeat_interval(),
            alive_threshold: default_alive_threshold(),
        }
    }
}

impl Validatable for ClusterConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        validate_required_string(&self.member_name, "member_name", self.domain_name())?;
        validate_required_string(&self.advertise_host, "advertise_host", self.domain_name())?;
        validate_required_string(&self.data_dir, "data_dir", self.domain_name())?;
        validate_positive(
            self.heartbeat_interval.as_secs(),
            "heartbeat_interval",
            self.domain_name(),
        )?;
        validate_positive(
            self.check_heartbeat_interval.as_secs(),
            "check_heartbeat_interval",
            self.domain_name(),
        )?;
        validate_positive(self.alive_threshold.as_secs(), "alive_threshold", self.domain_name())?;

        // A member whose heartbeat cadence exceeds the threshold flaps between
        // alive and not-alive on every detection pass.
        if self.alive_threshold <= self.heartbeat_interval {
            return Err(self.validation_error("alive_threshold must exceed heartbeat_interval"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "cluster"
    }
}

// Default value functions
fn default_cluster_name() -> String {
    "hive".to_string()
}

fn default_member_name() -> String {
    "hive-1".to_string()
}

fn default_advertise_host() -> String {
    "127.0.0.1".to_string()
}

fn default_data_dir() -> String {
    "hive-data".to_string()
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_check_heartbeat_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_alive_threshold() -> Duration {
    Duration::from_secs(7)
}
