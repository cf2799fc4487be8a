//! Operational endpoints: health, readiness and liveness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use roster_management::ManagementState;
use serde::Serialize;
use std::time::Instant;
use utoipa::ToSchema;

/// Shared state for the operational endpoints.
#[derive(Clone)]
pub struct ProbeState {
    pub node_id: String,
    pub start_time: Instant,
    pub management: ManagementState,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub campaigns: usize,
    pub recipients: usize,
    pub pending_uploads: usize,
    pub delivery_events: usize,
}

/// GET /health: Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check(State(state): State<ProbeState>) -> Json<HealthResponse> {
    let management = &state.management;
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        campaigns: management.campaigns.list().len(),
        recipients: management.campaigns.store().recipient_total(),
        pending_uploads: management.importer.cache().len(),
        delivery_events: management.events.len(),
    })
}

/// GET /ready: Readiness probe for Kubernetes.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses((status = 200, description = "Ready to accept traffic"))
)]
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live: Liveness probe for Kubernetes.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
