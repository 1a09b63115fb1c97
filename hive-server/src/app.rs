//! Axum application: submission API and liveness probe

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use hive_kernel::{Job, JobRegistry};

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
struct AppState {
    registry: Arc<JobRegistry>,
}

/// Build the API router around a job registry
pub fn router(registry: Arc<JobRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/jobs", post(submit_job).get(list_jobs))
        .route("/v1/jobs/{id}", axum::routing::delete(remove_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process stops
pub async fn serve(listen_addr: &str, registry: Arc<JobRegistry>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("API server listening on {}", listen_addr);
    axum::serve(listener, router(registry)).await
}

/// Liveness probe used by peer health checks and external monitors
async fn health() -> &'static str {
    debug!("Health check requested");
    "OK"
}

/// Register a job; the raw request body is the opaque payload
async fn submit_job(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Job>> {
    let job = state.registry.add_job(body.to_vec()).await?;
    Ok(Json(job))
}

async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<Job>>> {
    let jobs = state.registry.get_all_jobs().await?;
    let mut jobs: Vec<Job> = jobs.into_values().collect();
    jobs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Json(jobs))
}

async fn remove_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    if !state.registry.remove_job(&id).await? {
        return Err(ApiError::NotFound(format!("job {}", id)));
    }
    Ok(Json(serde_json::json!({ "removed": id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hive_kv::MemoryStore;
    use tower::ServiceExt;

    fn test_router() -> (Router, Arc<JobRegistry>) {
        let registry = Arc::new(JobRegistry::new("c1", "m1", Arc::new(MemoryStore::new())));
        (router(Arc::clone(&registry)), registry)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = test_router();

        let response = app
            .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_submit_returns_stored_job() {
        let (app, registry) = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/jobs")
                    .body(Body::from("#echo:hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let job = body_json(response).await;
        let id = job["id"].as_str().unwrap().to_string();

        // The stored payload is identical to the submitted body.
        let stored = registry.get_job(&id).await.unwrap().unwrap();
        assert_eq!(stored.payload, b"#echo:hello".to_vec());
    }

    #[tokio::test]
    async fn test_list_jobs() {
        let (app, registry) = test_router();
        registry.add_job(b"one".to_vec()).await.unwrap();
        registry.add_job(b"two".to_vec()).await.unwrap();

        let response = app
            .oneshot(Request::builder().uri("/v1/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let jobs = body_json(response).await;
        assert_eq!(jobs.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_job() {
        let (app, registry) = test_router();
        let job = registry.add_job(b"x".to_vec()).await.unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v1/jobs/{}", job.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/v1/jobs/{}", job.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
