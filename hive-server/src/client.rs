//! Client for a peer daemon's API

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use hive_kernel::{Job, Member, MemberHealthCheck};

use crate::error::{ApiError, ApiResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to one daemon's submission API
#[derive(Debug, Clone)]
pub struct ApiClient {
    daemon_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(daemon_url: impl Into<String>) -> Self {
        Self {
            daemon_url: daemon_url.into(),
            client: http_client(),
        }
    }

    /// Whether the daemon answers its liveness probe
    pub async fn health(&self) -> bool {
        check_health(&self.client, &self.daemon_url).await
    }

    /// Submit a payload; returns the stored job (id + payload)
    pub async fn submit_job(&self, payload: Vec<u8>) -> ApiResult<Job> {
        let response = self
            .client
            .post(format!("{}/v1/jobs", self.daemon_url))
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Remove a job by id
    pub async fn remove_job(&self, job_id: &str) -> ApiResult<()> {
        let response = self
            .client
            .delete(format!("{}/v1/jobs/{}", self.daemon_url, job_id))
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(()),
            404 => Err(ApiError::NotFound(format!("job {}", job_id))),
            status => Err(ApiError::UnexpectedStatus(status)),
        }
    }

    /// List stored jobs
    pub async fn list_jobs(&self) -> ApiResult<Vec<Job>> {
        let response = self
            .client
            .get(format!("{}/v1/jobs", self.daemon_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}

/// Liveness delegate probing a peer's health endpoint
///
/// Installed on the coordinator so an unmoved heartbeat gets a second
/// opinion over HTTP before the peer is declared dead.
pub struct HttpHealthCheck {
    client: reqwest::Client,
}

impl HttpHealthCheck {
    pub fn new() -> Self {
        Self { client: http_client() }
    }
}

impl Default for HttpHealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemberHealthCheck for HttpHealthCheck {
    async fn is_alive(&self, member: &Member) -> bool {
        if member.daemon_url.is_empty() {
            return false;
        }
        let alive = check_health(&self.client, &member.daemon_url).await;
        debug!("Health probe for {}: alive={}", member.id, alive);
        alive
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        // Builder only fails on TLS backend misconfiguration.
        .unwrap_or_default()
}

async fn check_health(client: &reqwest::Client, daemon_url: &str) -> bool {
    match client.head(format!("{}/v1/health", daemon_url)).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
