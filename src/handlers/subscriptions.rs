//! # Subscription Handlers
//!
//! Read endpoints for subscriptions and their status history, plus the admin
//! auto-provisioning entry point.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{subscription, subscription_status_history};
use crate::server::AppState;
use crate::services::subscriptions::ProvisionOutcome;

use super::actor_from_headers;

/// Subscription view
#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub model_id: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub requests_used: i64,
    pub requests_allotted: Option<i64>,
    pub tokens_used: i64,
    pub tokens_allotted: Option<i64>,
    pub max_budget: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<subscription::Model> for SubscriptionView {
    fn from(s: subscription::Model) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            model_id: s.model_id,
            status: s.status,
            status_reason: s.status_reason,
            status_changed_at: s.status_changed_at.map(|at| at.with_timezone(&Utc)),
            requests_used: s.requests_used,
            requests_allotted: s.requests_allotted,
            tokens_used: s.tokens_used,
            tokens_allotted: s.tokens_allotted,
            max_budget: s.max_budget,
            created_at: s.created_at.with_timezone(&Utc),
        }
    }
}

/// One status transition
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryEntry {
    pub old_status: Option<String>,
    pub new_status: String,
    pub reason: Option<String>,
    pub changed_by: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
}

impl From<subscription_status_history::Model> for HistoryEntry {
    fn from(h: subscription_status_history::Model) -> Self {
        Self {
            old_status: h.old_status,
            new_status: h.new_status,
            reason: h.reason,
            changed_by: h.changed_by,
            changed_at: h.changed_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnsureActiveRequest {
    pub model_ids: Vec<String>,
}

/// List a user's subscriptions
#[utoipa::path(
    get,
    path = "/users/{user_id}/subscriptions",
    params(("user_id" = Uuid, Path, description = "Owning user")),
    responses(
        (status = 200, description = "Subscriptions", body = Vec<SubscriptionView>)
    ),
    tag = "subscriptions"
)]
pub async fn list_user_subscriptions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<SubscriptionView>>, ApiError> {
    let subs = state.subscriptions.list_user_subscriptions(user_id).await?;
    Ok(Json(subs.into_iter().map(Into::into).collect()))
}

/// Admin auto-provisioning: ensure active subscriptions for the given models
#[utoipa::path(
    post,
    path = "/users/{user_id}/subscriptions/ensure-active",
    params(("user_id" = Uuid, Path, description = "Owning user")),
    request_body = EnsureActiveRequest,
    responses(
        (status = 200, description = "Per-model provisioning outcomes", body = Vec<ProvisionOutcome>)
    ),
    tag = "subscriptions"
)]
pub async fn ensure_active(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<EnsureActiveRequest>,
) -> Result<Json<Vec<ProvisionOutcome>>, ApiError> {
    let outcomes = state
        .subscriptions
        .ensure_active_subscriptions(user_id, &req.model_ids, actor_from_headers(&headers))
        .await?;
    Ok(Json(outcomes))
}

/// Status history for one subscription, newest first
#[utoipa::path(
    get,
    path = "/subscriptions/{subscription_id}/history",
    params(("subscription_id" = Uuid, Path, description = "Subscription")),
    responses(
        (status = 200, description = "Status transitions", body = Vec<HistoryEntry>)
    ),
    tag = "subscriptions"
)]
pub async fn status_history(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let history = state.subscriptions.status_history(subscription_id).await?;
    Ok(Json(history.into_iter().map(Into::into).collect()))
}
