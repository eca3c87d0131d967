//! # API Key Handlers
//!
//! Endpoints for key lifecycle: create, list, update, revoke/delete, rotate,
//! full-secret retrieval, validation, and the legacy hash repair pass.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;
use crate::services::api_keys::{CreateKeyRequest, CreatedKey, KeySummary};

use super::actor_from_headers;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteKeyQuery {
    /// Hard-delete the local row instead of a soft revoke
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateKeyRequest {
    pub key: String,
}

/// Validation outcome; the key row itself is never exposed here
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateKeyResponse {
    pub is_valid: bool,
    pub key_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub model_ids: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FullKeyResponse {
    pub key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RepairReport {
    pub repaired: u64,
}

/// Create an API key for a user
#[utoipa::path(
    post,
    path = "/users/{user_id}/api-keys",
    params(("user_id" = Uuid, Path, description = "Owning user")),
    request_body = CreateKeyRequest,
    responses(
        (status = 200, description = "Created key; the plaintext secret appears here exactly once", body = CreatedKey),
        (status = 400, description = "Admission check failed", body = ApiError),
        (status = 503, description = "Proxy unavailable", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<CreateKeyRequest>,
) -> Result<Json<CreatedKey>, ApiError> {
    let created = state
        .api_keys
        .create_api_key(user_id, req, actor_from_headers(&headers))
        .await?;
    Ok(Json(created))
}

/// List a user's keys (masked)
#[utoipa::path(
    get,
    path = "/users/{user_id}/api-keys",
    params(("user_id" = Uuid, Path, description = "Owning user")),
    responses(
        (status = 200, description = "Masked key list", body = Vec<KeySummary>)
    ),
    tag = "api-keys"
)]
pub async fn list_api_keys(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<KeySummary>>, ApiError> {
    Ok(Json(state.api_keys.get_user_api_keys(user_id).await?))
}

/// Update a key's name and/or model list
#[utoipa::path(
    patch,
    path = "/users/{user_id}/api-keys/{key_id}",
    params(
        ("user_id" = Uuid, Path, description = "Owning user"),
        ("key_id" = Uuid, Path, description = "Key to update")
    ),
    request_body = UpdateKeyRequest,
    responses(
        (status = 200, description = "Updated key", body = KeySummary),
        (status = 404, description = "Key not found", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn update_api_key(
    State(state): State<AppState>,
    Path((user_id, key_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    Json(req): Json<UpdateKeyRequest>,
) -> Result<Json<KeySummary>, ApiError> {
    let updated = state
        .api_keys
        .update_api_key(user_id, key_id, req.name, req.model_ids, actor_from_headers(&headers))
        .await?;
    Ok(Json(updated))
}

/// Revoke a key (soft), or hard-delete it with `?permanent=true`
#[utoipa::path(
    delete,
    path = "/users/{user_id}/api-keys/{key_id}",
    params(
        ("user_id" = Uuid, Path, description = "Owning user"),
        ("key_id" = Uuid, Path, description = "Key to delete"),
        DeleteKeyQuery
    ),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Key not found", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn delete_api_key(
    State(state): State<AppState>,
    Path((user_id, key_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<DeleteKeyQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers);
    if query.permanent {
        state
            .api_keys
            .permanently_delete_api_key(user_id, key_id, actor)
            .await?;
    } else {
        state.api_keys.delete_api_key(user_id, key_id, actor).await?;
    }
    Ok(Json(super::status_json("deleted")))
}

/// Rotate a key's secret
#[utoipa::path(
    post,
    path = "/users/{user_id}/api-keys/{key_id}/rotate",
    params(
        ("user_id" = Uuid, Path, description = "Owning user"),
        ("key_id" = Uuid, Path, description = "Key to rotate")
    ),
    responses(
        (status = 200, description = "Rotated key with the new plaintext secret", body = CreatedKey),
        (status = 400, description = "Key is revoked", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Path((user_id, key_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<CreatedKey>, ApiError> {
    let rotated = state
        .api_keys
        .rotate_api_key(user_id, key_id, actor_from_headers(&headers))
        .await?;
    Ok(Json(rotated))
}

/// Retrieve the full plaintext secret; each call is audit-logged
#[utoipa::path(
    get,
    path = "/users/{user_id}/api-keys/{key_id}/full",
    params(
        ("user_id" = Uuid, Path, description = "Owning user"),
        ("key_id" = Uuid, Path, description = "Key to read")
    ),
    responses(
        (status = 200, description = "Plaintext secret", body = FullKeyResponse),
        (status = 400, description = "Key revoked or expired", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn retrieve_full_key(
    State(state): State<AppState>,
    Path((user_id, key_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<FullKeyResponse>, ApiError> {
    let key = state
        .api_keys
        .retrieve_full_key(user_id, key_id, actor_from_headers(&headers))
        .await?;
    Ok(Json(FullKeyResponse { key }))
}

/// Validate a raw key value
#[utoipa::path(
    post,
    path = "/api-keys/validate",
    request_body = ValidateKeyRequest,
    responses(
        (status = 200, description = "Validation outcome", body = ValidateKeyResponse)
    ),
    tag = "api-keys"
)]
pub async fn validate_api_key(
    State(state): State<AppState>,
    Json(req): Json<ValidateKeyRequest>,
) -> Result<Json<ValidateKeyResponse>, ApiError> {
    let outcome = state.api_keys.validate_api_key(&req.key).await?;
    Ok(Json(ValidateKeyResponse {
        is_valid: outcome.is_valid,
        key_id: outcome.api_key.as_ref().map(|k| k.id),
        user_id: outcome.api_key.as_ref().map(|k| k.user_id),
        model_ids: outcome.model_ids,
        error: outcome.error,
    }))
}

/// One-time repair pass for legacy key hashes
#[utoipa::path(
    post,
    path = "/api-keys/repair-hashes",
    responses(
        (status = 200, description = "Number of rows repaired", body = RepairReport)
    ),
    tag = "api-keys"
)]
pub async fn repair_key_hashes(
    State(state): State<AppState>,
) -> Result<Json<RepairReport>, ApiError> {
    let repaired = state.api_keys.repair_legacy_key_hashes().await?;
    Ok(Json(RepairReport { repaired }))
}
