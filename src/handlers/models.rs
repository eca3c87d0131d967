//! # Model Catalog Handlers
//!
//! Endpoints for the model catalog: listing, sync, availability and
//! restriction changes, and admin create/update/delete.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::model;
use crate::server::AppState;
use crate::services::model_sync::{
    CascadeStats, ModelDefinition, RestrictionChange, SyncReport, SyncStats, ValidationReport,
};

use super::actor_from_headers;

/// Catalog entry view
#[derive(Debug, Serialize, ToSchema)]
pub struct ModelView {
    pub id: String,
    pub provider: String,
    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,
    pub context_length: Option<i32>,
    pub supports_vision: bool,
    pub supports_function_calling: bool,
    pub supports_parallel_function_calling: bool,
    pub supports_tool_choice: bool,
    pub availability: String,
    pub restricted_access: bool,
    pub description: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<model::Model> for ModelView {
    fn from(m: model::Model) -> Self {
        Self {
            id: m.id,
            provider: m.provider,
            input_cost_per_token: m.input_cost_per_token,
            output_cost_per_token: m.output_cost_per_token,
            context_length: m.context_length,
            supports_vision: m.supports_vision,
            supports_function_calling: m.supports_function_calling,
            supports_parallel_function_calling: m.supports_parallel_function_calling,
            supports_tool_choice: m.supports_tool_choice,
            availability: m.availability,
            restricted_access: m.restricted_access,
            description: m.description,
            last_synced_at: m.last_synced_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

/// Request body for sync runs
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SyncRequest {
    /// Rewrite existing rows even when unchanged
    #[serde(default)]
    pub force_update: bool,
    /// Cascade locally-available models absent from the proxy. With an empty
    /// proxy list this deactivates the entire catalog.
    #[serde(default = "default_true")]
    pub mark_unavailable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RestrictionRequest {
    pub restricted_access: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateModelRequest {
    pub id: String,
    #[serde(flatten)]
    pub definition: ModelDefinition,
}

/// List the model catalog
#[utoipa::path(
    get,
    path = "/models",
    responses(
        (status = 200, description = "Model catalog", body = Vec<ModelView>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "models"
)]
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelView>>, ApiError> {
    let repo = crate::repositories::ModelRepository::new(state.db.clone());
    let rows = repo.find_all().await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Run a catalog sync against the proxy
#[utoipa::path(
    post,
    path = "/models/sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Sync report (partial progress reported, never thrown away)", body = SyncReport),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "models"
)]
pub async fn sync_models(
    State(state): State<AppState>,
    body: Option<Json<SyncRequest>>,
) -> Result<Json<SyncReport>, ApiError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let report = state
        .model_sync
        .sync_models(req.force_update, req.mark_unavailable)
        .await?;
    Ok(Json(report))
}

/// Catalog integrity check
#[utoipa::path(
    get,
    path = "/models/validate",
    responses(
        (status = 200, description = "Integrity report", body = ValidationReport)
    ),
    tag = "models"
)]
pub async fn validate_models(
    State(state): State<AppState>,
) -> Result<Json<ValidationReport>, ApiError> {
    Ok(Json(state.model_sync.validate_models().await?))
}

/// Catalog counters
#[utoipa::path(
    get,
    path = "/models/stats",
    responses(
        (status = 200, description = "Catalog counters", body = SyncStats)
    ),
    tag = "models"
)]
pub async fn sync_stats(State(state): State<AppState>) -> Result<Json<SyncStats>, ApiError> {
    Ok(Json(state.model_sync.get_sync_stats().await?))
}

/// Mark one model unavailable and cascade
#[utoipa::path(
    post,
    path = "/models/{model_id}/unavailable",
    params(("model_id" = String, Path, description = "Catalog model id")),
    responses(
        (status = 200, description = "Cascade side-effect counts", body = CascadeStats),
        (status = 404, description = "Model not found", body = ApiError)
    ),
    tag = "models"
)]
pub async fn mark_unavailable(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CascadeStats>, ApiError> {
    let stats = state
        .model_sync
        .mark_model_unavailable(&model_id, actor_from_headers(&headers))
        .await?;
    Ok(Json(stats))
}

/// Toggle a model's restricted-access flag
#[utoipa::path(
    patch,
    path = "/models/{model_id}/restriction",
    params(("model_id" = String, Path, description = "Catalog model id")),
    request_body = RestrictionRequest,
    responses(
        (status = 200, description = "Restriction change outcome", body = RestrictionChange),
        (status = 404, description = "Model not found", body = ApiError)
    ),
    tag = "models"
)]
pub async fn update_restriction(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RestrictionRequest>,
) -> Result<Json<RestrictionChange>, ApiError> {
    let change = state
        .model_sync
        .update_model_restriction(&model_id, req.restricted_access, actor_from_headers(&headers))
        .await?;
    Ok(Json(change))
}

/// Register a model on the proxy and in the catalog
#[utoipa::path(
    post,
    path = "/models",
    request_body = CreateModelRequest,
    responses(
        (status = 200, description = "Created catalog entry", body = ModelView),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 503, description = "Proxy unavailable", body = ApiError)
    ),
    tag = "models"
)]
pub async fn create_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateModelRequest>,
) -> Result<Json<ModelView>, ApiError> {
    let created = state
        .model_sync
        .create_model(&req.id, req.definition, actor_from_headers(&headers))
        .await?;
    Ok(Json(created.into()))
}

/// Update a model on the proxy and in the catalog
#[utoipa::path(
    patch,
    path = "/models/{model_id}",
    params(("model_id" = String, Path, description = "Catalog model id")),
    request_body = ModelDefinition,
    responses(
        (status = 200, description = "Updated catalog entry", body = ModelView),
        (status = 404, description = "Model not found", body = ApiError)
    ),
    tag = "models"
)]
pub async fn update_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    headers: HeaderMap,
    Json(definition): Json<ModelDefinition>,
) -> Result<Json<ModelView>, ApiError> {
    let updated = state
        .model_sync
        .update_model(&model_id, definition, actor_from_headers(&headers))
        .await?;
    Ok(Json(updated.into()))
}

/// Delete a model from the proxy and the catalog
#[utoipa::path(
    delete,
    path = "/models/{model_id}",
    params(("model_id" = String, Path, description = "Catalog model id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Model not found", body = ApiError)
    ),
    tag = "models"
)]
pub async fn delete_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>, ApiError> {
    state
        .model_sync
        .delete_model(&model_id, actor_from_headers(&headers))
        .await?;
    Ok(Json(super::status_json("deleted")))
}
