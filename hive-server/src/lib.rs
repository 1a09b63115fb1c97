//! HTTP front door for a Hive daemon
//!
//! Exposes the submission API (`POST /v1/jobs`, `DELETE /v1/jobs/{id}`,
//! `GET /v1/jobs`) and the liveness probe (`GET|HEAD /v1/health`) peers use
//! for health checks, plus the reqwest-based client of those endpoints.

pub mod app;
pub mod client;
pub mod error;

pub use app::{router, serve};
pub use client::{ApiClient, HttpHealthCheck};
pub use error::{ApiError, ApiResult};
