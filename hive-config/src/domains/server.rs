//! HTTP API server configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// The socket address string the server listens on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.bind_address, "bind_address", self.domain_name())?;
        validate_positive(self.port, "port", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server"
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}
