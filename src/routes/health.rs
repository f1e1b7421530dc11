/**
 * Health Routes
 * Liveness and store health
 */
use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::state::AppState;

lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Pin the uptime origin to process start rather than first request.
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
}

/// Store check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health
pub async fn health_ping() -> impl IntoResponse {
    Json(PingResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime: SERVER_START.elapsed().as_secs(),
    })
}

/// GET /health/database
/// Always 200 so monitors can read the body; `status` says healthy or not.
pub async fn health_database(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.store.kind().to_string();
    let check = match state.store.health().await {
        Ok(duration) => ServiceCheck {
            status: "healthy".to_string(),
            backend,
            response_time: Some(duration.as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "database health check failed");
            ServiceCheck {
                status: "unhealthy".to_string(),
                backend,
                response_time: None,
                error: Some("Database unreachable".to_string()),
            }
        }
    };
    Json(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::TestApp;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        init_start_time();
        let app = TestApp::new();
        let (status, bytes) = app.get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let body: PingResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_health_database_reports_memory_backend() {
        let app = TestApp::new();
        let (status, bytes) = app.get("/health/database", None).await;
        assert_eq!(status, StatusCode::OK);
        let body: ServiceCheck = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "healthy");
        assert_eq!(body.backend, "memory");
    }
}
