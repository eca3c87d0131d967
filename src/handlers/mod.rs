//! # API Handlers
//!
//! Thin HTTP endpoint handlers for the admin API. Every handler delegates to
//! a service; nothing here carries business logic.

pub mod api_keys;
pub mod models;
pub mod subscriptions;
pub mod usage;

use axum::{extract::State, http::HeaderMap, response::Json};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db;
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health response covering the database and the proxy
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub proxy: String,
}

/// Liveness/readiness probe. Proxy unreachability degrades the report but
/// never fails the endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Component health", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match db::health_check(&state.db).await {
        Ok(()) => "ok",
        Err(_) => "unreachable",
    };
    let proxy = match state.proxy.health(false).await {
        Ok(_) => "ok",
        Err(_) => "unreachable",
    };
    let status = if database == "ok" { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        database: database.to_string(),
        proxy: proxy.to_string(),
    })
}

/// Optional acting-admin identifier carried on mutating requests
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

pub(crate) fn status_json(message: &str) -> JsonValue {
    json!({ "status": message })
}
