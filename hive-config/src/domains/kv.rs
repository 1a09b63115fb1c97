//! Coordination store (etcd) configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// KV store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    /// etcd endpoint URLs
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Connection establishment timeout
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Per-request timeout
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Validatable for KvConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.endpoints.is_empty() {
            return Err(self.validation_error("at least one endpoint is required"));
        }

        for endpoint in &self.endpoints {
            validate_url(endpoint, "endpoints", self.domain_name())?;
        }

        validate_positive(self.connect_timeout.as_secs(), "connect_timeout", self.domain_name())?;
        validate_positive(self.request_timeout.as_secs(), "request_timeout", self.domain_name())?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "kv"
    }
}

// Default value functions
fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}
