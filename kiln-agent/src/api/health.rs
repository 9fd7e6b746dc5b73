//! Health Check API Handlers
//!
//! Liveness and service information endpoints, no authentication required.

use axum::{Json, extract::State};
use kiln_core::dto::health::{HealthResponse, HealthStatus, ServiceInfo};

use crate::api::AppState;

pub const SERVICE_NAME: &str = "kiln-agent";

/// GET /
/// Service name, version and status
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

/// GET /health
/// Reports whether the container runtime can serve jobs
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, runtime_version) = match state.executor.runtime().version().await {
        Ok(version) => (HealthStatus::Healthy, Some(version)),
        Err(e) => {
            tracing::warn!("Container runtime unavailable: {}", e);
            (HealthStatus::Degraded, None)
        }
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        runtime_available: runtime_version.is_some(),
        runtime_version,
    })
}
