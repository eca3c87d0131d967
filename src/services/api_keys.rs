//! API key lifecycle manager
//!
//! Admission-controlled creation and mutation of multi-model API keys. The
//! external proxy is the write-of-record for the secret itself: the local
//! `key_hash` is always computed from the proxy-returned value, and any path
//! that removes model access updates the proxy before touching local rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::api_key::{self, sync_status};
use crate::models::api_key_model;
use crate::models::subscription::status as sub_status;
use crate::proxy::{GenerateKeyRequest, ProxyClient, ProxyError};
use crate::repositories::{ApiKeyRepository, SubscriptionRepository, UserRepository};
use crate::services::AuditService;

/// Incoming key-creation request: the current multi-model shape or the
/// legacy single-subscription shape. Normalized once at the entry point.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum CreateKeyRequest {
    MultiModel(MultiModelKeyRequest),
    Legacy(LegacyKeyRequest),
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MultiModelKeyRequest {
    pub name: String,
    pub model_ids: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_budget: Option<f64>,
    #[serde(default)]
    pub soft_budget: Option<f64>,
    #[serde(default)]
    pub budget_duration: Option<String>,
    #[serde(default)]
    pub tpm_limit: Option<i64>,
    #[serde(default)]
    pub rpm_limit: Option<i64>,
    #[serde(default)]
    pub max_parallel_requests: Option<i32>,
    /// Per-model budget/limit overrides, keyed by model id
    #[serde(default)]
    pub per_model_limits: Option<JsonValue>,
}

/// Pre-join-table request shape kept for older clients
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LegacyKeyRequest {
    pub name: String,
    pub subscription_id: Uuid,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_budget: Option<f64>,
}

/// Canonical internal form every creation path resolves to
#[derive(Debug, Clone)]
struct NewKeySpec {
    name: String,
    model_ids: Vec<String>,
    legacy_subscription_id: Option<Uuid>,
    expires_at: Option<DateTime<Utc>>,
    max_budget: Option<f64>,
    soft_budget: Option<f64>,
    budget_duration: Option<String>,
    tpm_limit: Option<i64>,
    rpm_limit: Option<i64>,
    max_parallel_requests: Option<i32>,
    per_model_limits: Option<JsonValue>,
}

/// Creation result; the only place the plaintext secret ever appears
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedKey {
    pub id: Uuid,
    pub name: String,
    /// Plaintext secret, returned exactly once
    pub key: String,
    pub key_prefix: String,
    pub key_alias: String,
    pub models: Vec<String>,
    pub max_budget: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Masked key view for list/read endpoints
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KeySummary {
    pub id: Uuid,
    pub name: String,
    /// Masked secret: prefix plus last four characters
    pub key_preview: String,
    pub models: Vec<String>,
    pub is_active: bool,
    pub sync_status: String,
    pub max_budget: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of validating a raw key value
#[derive(Debug)]
pub struct KeyValidation {
    pub is_valid: bool,
    pub api_key: Option<api_key::Model>,
    pub model_ids: Vec<String>,
    pub error: Option<String>,
}

impl KeyValidation {
    fn rejected(reason: &str) -> Self {
        Self {
            is_valid: false,
            api_key: None,
            model_ids: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

/// Report for the proxy-first model-removal path
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ModelRemovalReport {
    pub keys_examined: u64,
    pub keys_updated: u64,
    pub links_removed: u64,
    pub keys_deactivated: u64,
    /// Keys whose proxy update failed; their local state was left untouched
    pub failed_key_ids: Vec<Uuid>,
}

/// API key lifecycle manager
#[derive(Clone)]
pub struct ApiKeyService {
    db: Arc<DatabaseConnection>,
    keys: ApiKeyRepository,
    subscriptions: SubscriptionRepository,
    users: UserRepository,
    proxy: Arc<ProxyClient>,
    audit: AuditService,
    config: Arc<AppConfig>,
}

impl ApiKeyService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        proxy: Arc<ProxyClient>,
        audit: AuditService,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            keys: ApiKeyRepository::new(Arc::clone(&db)),
            subscriptions: SubscriptionRepository::new(Arc::clone(&db)),
            users: UserRepository::new(Arc::clone(&db)),
            db,
            proxy,
            audit,
            config,
        }
    }

    /// Create a key for `user_id`. Admission checks run first; the proxy
    /// issues the secret; the local row and its model links persist in one
    /// transaction. Any post-generate failure triggers a best-effort proxy
    /// key deletion so no live credential is left without a local record.
    pub async fn create_api_key(
        &self,
        user_id: Uuid,
        request: CreateKeyRequest,
        actor_id: Option<Uuid>,
    ) -> Result<CreatedKey, ApiError> {
        let spec = self.normalize(request).await?;

        let user = self
            .users
            .find_by_id(&user_id)
            .await?
            .ok_or_else(|| not_found("User", &user_id.to_string()))?;

        if spec.model_ids.is_empty() {
            return Err(validation_error(
                "At least one model is required",
                json!({ "model_ids": "empty" }),
            ));
        }

        let missing = self.missing_active_subscriptions(&user_id, &spec.model_ids).await?;
        if !missing.is_empty() {
            return Err(validation_error(
                "No active subscription for requested models",
                json!({ "missing_model_ids": missing }),
            ));
        }

        let active_count = self.keys.count_active_by_user(&user_id).await?;
        if active_count >= self.config.keys.max_keys_per_user {
            return Err(validation_error(
                "Active key limit reached",
                json!({ "max_keys_per_user": self.config.keys.max_keys_per_user }),
            ));
        }

        // Lazy provisioning: the proxy must know the user (and team) before
        // it will bind a key to them.
        self.proxy.ensure_user(&user_id.to_string(), Some(&user.email)).await?;
        if let Some(team_id) = &self.config.proxy.team_id {
            self.proxy.ensure_team(team_id).await?;
        }

        let alias = self.unique_alias(&spec.name).await?;
        let generated = self
            .proxy
            .generate_key(&GenerateKeyRequest {
                models: spec.model_ids.clone(),
                key_alias: alias.clone(),
                user_id: user_id.to_string(),
                team_id: self.config.proxy.team_id.clone(),
                max_budget: spec.max_budget,
                soft_budget: spec.soft_budget,
                budget_duration: spec.budget_duration.clone(),
                tpm_limit: spec.tpm_limit,
                rpm_limit: spec.rpm_limit,
                max_parallel_requests: spec.max_parallel_requests,
                duration: spec.expires_at.map(duration_until),
                model_max_budget: extract_model_budgets(spec.per_model_limits.as_ref()),
                ..Default::default()
            })
            .await?;

        match self.persist_new_key(&user_id, &spec, &alias, &generated.key).await {
            Ok(created) => {
                self.audit
                    .record(
                        actor_id,
                        "api_key.create",
                        "api_key",
                        &created.id.to_string(),
                        Some(json!({
                            "name": created.name,
                            "models": created.models,
                            "alias": alias,
                        })),
                        true,
                    )
                    .await;
                Ok(created)
            }
            Err(err) => {
                // The proxy-side key exists but we could not record it; try
                // to delete it so no orphaned live credential remains.
                if let Err(cleanup_err) = self.proxy.delete_key(&generated.key).await {
                    tracing::error!(
                        alias,
                        error = %cleanup_err,
                        "Failed to clean up proxy key after local persist failure"
                    );
                }
                self.audit
                    .record(
                        actor_id,
                        "api_key.create",
                        "api_key",
                        &alias,
                        Some(json!({ "error": err.message })),
                        false,
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn persist_new_key(
        &self,
        user_id: &Uuid,
        spec: &NewKeySpec,
        alias: &str,
        secret: &str,
    ) -> Result<CreatedKey, ApiError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let key_hash = hash_secret(secret);
        let key_prefix = display_prefix(secret);

        let txn = self.db.begin().await?;

        let row = api_key::ActiveModel {
            id: Set(id),
            user_id: Set(*user_id),
            name: Set(spec.name.clone()),
            key_hash: Set(key_hash),
            key_prefix: Set(key_prefix.clone()),
            external_key_value: Set(secret.to_string()),
            external_key_alias: Set(alias.to_string()),
            subscription_id: Set(spec.legacy_subscription_id),
            max_budget: Set(spec.max_budget),
            soft_budget: Set(spec.soft_budget),
            budget_duration: Set(spec.budget_duration.clone()),
            tpm_limit: Set(spec.tpm_limit),
            rpm_limit: Set(spec.rpm_limit),
            max_parallel_requests: Set(spec.max_parallel_requests),
            per_model_limits: Set(spec.per_model_limits.clone()),
            is_active: Set(true),
            expires_at: Set(spec.expires_at.map(Into::into)),
            revoked_at: Set(None),
            last_used_at: Set(None),
            sync_status: Set(sync_status::SYNCED.to_string()),
            sync_error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        row.insert(&txn).await?;

        for model_id in &spec.model_ids {
            let link = api_key_model::ActiveModel {
                api_key_id: Set(id),
                model_id: Set(model_id.clone()),
                created_at: Set(now.into()),
            };
            link.insert(&txn).await?;
        }

        txn.commit().await?;

        Ok(CreatedKey {
            id,
            name: spec.name.clone(),
            key: secret.to_string(),
            key_prefix,
            key_alias: alias.to_string(),
            models: spec.model_ids.clone(),
            max_budget: spec.max_budget,
            expires_at: spec.expires_at,
        })
    }

    /// Masked list of a user's keys
    pub async fn get_user_api_keys(&self, user_id: Uuid) -> Result<Vec<KeySummary>, ApiError> {
        let rows = self.keys.find_by_user(&user_id).await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let models = self.resolve_model_ids(&row).await?;
            summaries.push(KeySummary {
                id: row.id,
                name: row.name,
                key_preview: mask_secret(&row.external_key_value),
                models,
                is_active: row.is_active,
                sync_status: row.sync_status,
                max_budget: row.max_budget,
                expires_at: row.expires_at.map(Into::into),
                last_used_at: row.last_used_at.map(Into::into),
                created_at: row.created_at.into(),
            });
        }
        Ok(summaries)
    }

    /// Update a key's display name and/or model list. Model-list changes hit
    /// the proxy first; the local links only change after the proxy accepted
    /// the new list.
    pub async fn update_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        name: Option<String>,
        model_ids: Option<Vec<String>>,
        actor_id: Option<Uuid>,
    ) -> Result<KeySummary, ApiError> {
        let key = self.owned_key(&user_id, &key_id).await?;

        if let Some(model_ids) = &model_ids {
            if model_ids.is_empty() {
                return Err(validation_error(
                    "A key must keep at least one model",
                    json!({ "model_ids": "empty" }),
                ));
            }
            let missing = self.missing_active_subscriptions(&user_id, model_ids).await?;
            if !missing.is_empty() {
                return Err(validation_error(
                    "No active subscription for requested models",
                    json!({ "missing_model_ids": missing }),
                ));
            }

            self.proxy
                .update_key(&key.external_key_value, &json!({ "models": model_ids }))
                .await?;
            self.keys.replace_model_links(&key_id, model_ids).await?;
        }

        if let Some(name) = &name {
            let mut active: api_key::ActiveModel = key.clone().into();
            active.name = Set(name.clone());
            active.updated_at = Set(Utc::now().into());
            self.keys.update(active).await?;
        }

        self.audit
            .record(
                actor_id,
                "api_key.update",
                "api_key",
                &key_id.to_string(),
                Some(json!({ "name": name, "models": model_ids })),
                true,
            )
            .await;

        let row = self
            .keys
            .find_by_id(&key_id)
            .await?
            .ok_or_else(|| not_found("API key", &key_id.to_string()))?;
        let models = self.resolve_model_ids(&row).await?;
        Ok(KeySummary {
            id: row.id,
            name: row.name,
            key_preview: mask_secret(&row.external_key_value),
            models,
            is_active: row.is_active,
            sync_status: row.sync_status,
            max_budget: row.max_budget,
            expires_at: row.expires_at.map(Into::into),
            last_used_at: row.last_used_at.map(Into::into),
            created_at: row.created_at.into(),
        })
    }

    /// Soft revoke: delete the proxy-side key (absence counts as success),
    /// then flag the local row inactive.
    pub async fn delete_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let key = self.owned_key(&user_id, &key_id).await?;

        self.proxy.delete_key(&key.external_key_value).await?;
        self.keys.deactivate(&key_id).await?;

        self.audit
            .record(
                actor_id,
                "api_key.revoke",
                "api_key",
                &key_id.to_string(),
                None,
                true,
            )
            .await;
        Ok(())
    }

    /// Permanent delete: proxy first, then the local row (links cascade).
    pub async fn permanently_delete_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let key = self.owned_key(&user_id, &key_id).await?;

        self.proxy.delete_key(&key.external_key_value).await?;
        api_key::Entity::delete_by_id(key_id).exec(&*self.db).await?;

        self.audit
            .record(
                actor_id,
                "api_key.delete",
                "api_key",
                &key_id.to_string(),
                None,
                true,
            )
            .await;
        Ok(())
    }

    /// Rotate the secret: generate a replacement proxy key under a fresh
    /// alias, swap the local row to it, then best-effort delete the old
    /// proxy key.
    pub async fn rotate_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<CreatedKey, ApiError> {
        let key = self.owned_key(&user_id, &key_id).await?;
        if !key.is_active {
            return Err(validation_error(
                "Cannot rotate a revoked key",
                json!({ "key_id": key_id.to_string() }),
            ));
        }

        let model_ids = self.resolve_model_ids(&key).await?;
        let alias = self.unique_alias(&key.name).await?;

        let generated = self
            .proxy
            .generate_key(&GenerateKeyRequest {
                models: model_ids.clone(),
                key_alias: alias.clone(),
                user_id: user_id.to_string(),
                team_id: self.config.proxy.team_id.clone(),
                max_budget: key.max_budget,
                soft_budget: key.soft_budget,
                budget_duration: key.budget_duration.clone(),
                tpm_limit: key.tpm_limit,
                rpm_limit: key.rpm_limit,
                max_parallel_requests: key.max_parallel_requests,
                duration: key
                    .expires_at
                    .map(|at| duration_until(at.with_timezone(&Utc))),
                model_max_budget: extract_model_budgets(key.per_model_limits.as_ref()),
                ..Default::default()
            })
            .await?;

        let old_secret = key.external_key_value.clone();
        let now = Utc::now();

        let mut active: api_key::ActiveModel = key.into();
        active.external_key_value = Set(generated.key.clone());
        active.key_hash = Set(hash_secret(&generated.key));
        active.key_prefix = Set(display_prefix(&generated.key));
        active.external_key_alias = Set(alias.clone());
        active.sync_status = Set(sync_status::SYNCED.to_string());
        active.sync_error = Set(None);
        active.updated_at = Set(now.into());
        let row = match self.keys.update(active).await {
            Ok(row) => row,
            Err(err) => {
                // The replacement proxy key exists but the local row still
                // points at the old secret; try to delete the new key so no
                // orphaned live credential remains.
                if let Err(cleanup_err) = self.proxy.delete_key(&generated.key).await {
                    tracing::error!(
                        alias,
                        error = %cleanup_err,
                        "Failed to clean up proxy key after rotation persist failure"
                    );
                }
                let err = ApiError::from(err);
                self.audit
                    .record(
                        actor_id,
                        "api_key.rotate",
                        "api_key",
                        &key_id.to_string(),
                        Some(json!({ "error": err.message })),
                        false,
                    )
                    .await;
                return Err(err);
            }
        };

        if let Err(err) = self.proxy.delete_key(&old_secret).await {
            tracing::warn!(key_id = %key_id, error = %err, "Failed to delete old proxy key after rotation");
        }

        self.audit
            .record(
                actor_id,
                "api_key.rotate",
                "api_key",
                &key_id.to_string(),
                Some(json!({ "alias": alias })),
                true,
            )
            .await;

        Ok(CreatedKey {
            id: row.id,
            name: row.name,
            key: generated.key,
            key_prefix: row.key_prefix,
            key_alias: alias,
            models: model_ids,
            max_budget: row.max_budget,
            expires_at: row.expires_at.map(Into::into),
        })
    }

    /// Return the plaintext secret for an active, unexpired key. Every
    /// retrieval is individually audit-logged.
    pub async fn retrieve_full_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<String, ApiError> {
        let key = self.owned_key(&user_id, &key_id).await?;

        if !key.is_active {
            return Err(validation_error(
                "Key is revoked",
                json!({ "key_id": key_id.to_string() }),
            ));
        }
        if is_expired(&key) {
            return Err(validation_error(
                "Key is expired",
                json!({ "key_id": key_id.to_string() }),
            ));
        }

        self.audit
            .record(
                actor_id,
                "api_key.retrieve_full",
                "api_key",
                &key_id.to_string(),
                None,
                true,
            )
            .await;

        Ok(key.external_key_value)
    }

    /// Validate a raw key value: format, hash lookup, active/expiry checks,
    /// with the legacy single-subscription fallback for keys that predate
    /// the join table. Touches `last_used_at` best-effort.
    pub async fn validate_api_key(&self, raw_key: &str) -> Result<KeyValidation, ApiError> {
        if !raw_key.starts_with(&self.config.keys.key_prefix) || raw_key.len() < 16 {
            return Ok(KeyValidation::rejected("malformed key"));
        }

        let hash = hash_secret(raw_key);
        let Some(key) = self.keys.find_by_key_hash(&hash).await? else {
            return Ok(KeyValidation::rejected("unknown key"));
        };

        if !key.is_active {
            return Ok(KeyValidation::rejected("key revoked"));
        }
        if is_expired(&key) {
            return Ok(KeyValidation::rejected("key expired"));
        }

        let mut model_ids = self.keys.model_ids_for_key(&key.id).await?;
        if model_ids.is_empty() {
            // Legacy key: resolve access through its single subscription.
            let Some(subscription_id) = key.subscription_id else {
                return Ok(KeyValidation::rejected("key has no model associations"));
            };
            let Some(subscription) = self.subscriptions.find_by_id(&subscription_id).await? else {
                return Ok(KeyValidation::rejected("legacy subscription missing"));
            };
            if subscription.status != sub_status::ACTIVE {
                return Ok(KeyValidation::rejected("legacy subscription not active"));
            }
            model_ids = vec![subscription.model_id];
        }

        let key_id = key.id;
        let mut active: api_key::ActiveModel = key.clone().into();
        active.last_used_at = Set(Some(Utc::now().into()));
        if let Err(err) = active.update(&*self.db).await {
            tracing::debug!(key_id = %key_id, error = %err, "Failed to touch last_used_at");
        }

        Ok(KeyValidation {
            is_valid: true,
            api_key: Some(key),
            model_ids,
            error: None,
        })
    }

    /// Strip one model from every active key referencing it. For each key the
    /// proxy's allowed-model list shrinks first; only after the proxy accepts
    /// does the local join row go away. A key whose proxy update fails keeps
    /// its local state untouched.
    pub async fn remove_model_from_user_api_keys(
        &self,
        model_id: &str,
    ) -> Result<ModelRemovalReport, ApiError> {
        let keys = self.keys.find_active_keys_for_model(model_id).await?;
        let mut report = ModelRemovalReport {
            keys_examined: keys.len() as u64,
            ..Default::default()
        };

        for key in keys {
            let current = self.keys.model_ids_for_key(&key.id).await?;
            let remaining: Vec<String> =
                current.into_iter().filter(|m| m != model_id).collect();

            match self
                .proxy
                .update_key(&key.external_key_value, &json!({ "models": remaining }))
                .await
            {
                Ok(_) => {
                    if self.keys.remove_model_link(&key.id, model_id).await? {
                        report.links_removed += 1;
                    }
                    report.keys_updated += 1;

                    if remaining.is_empty() {
                        self.keys.deactivate(&key.id).await?;
                        report.keys_deactivated += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        key_id = %key.id,
                        model_id,
                        error = %err,
                        "Proxy key update failed; leaving local associations untouched"
                    );
                    self.keys
                        .set_sync_status(&key.id, sync_status::ERROR, Some(&err.to_string()))
                        .await?;
                    report.failed_key_ids.push(key.id);
                }
            }
        }

        Ok(report)
    }

    /// One-time repair pass restoring `key_hash == sha256(external_key_value)`
    /// for legacy rows hashed from a locally generated value.
    pub async fn repair_legacy_key_hashes(&self) -> Result<u64, ApiError> {
        let mut repaired = 0;
        for key in self.keys.find_all().await? {
            let expected = hash_secret(&key.external_key_value);
            if key.key_hash != expected {
                let key_id = key.id;
                let mut active: api_key::ActiveModel = key.into();
                active.key_hash = Set(expected);
                active.updated_at = Set(Utc::now().into());
                self.keys.update(active).await?;
                repaired += 1;
                tracing::info!(key_id = %key_id, "Repaired legacy key hash");
            }
        }
        Ok(repaired)
    }

    // --- helpers ---

    async fn normalize(&self, request: CreateKeyRequest) -> Result<NewKeySpec, ApiError> {
        match request {
            CreateKeyRequest::MultiModel(req) => Ok(NewKeySpec {
                name: req.name,
                model_ids: req.model_ids,
                legacy_subscription_id: None,
                expires_at: req.expires_at,
                max_budget: req.max_budget,
                soft_budget: req.soft_budget,
                budget_duration: req.budget_duration,
                tpm_limit: req.tpm_limit,
                rpm_limit: req.rpm_limit,
                max_parallel_requests: req.max_parallel_requests,
                per_model_limits: req.per_model_limits,
            }),
            CreateKeyRequest::Legacy(req) => {
                let subscription = self
                    .subscriptions
                    .find_by_id(&req.subscription_id)
                    .await?
                    .ok_or_else(|| {
                        not_found("Subscription", &req.subscription_id.to_string())
                    })?;
                Ok(NewKeySpec {
                    name: req.name,
                    model_ids: vec![subscription.model_id],
                    legacy_subscription_id: Some(req.subscription_id),
                    expires_at: req.expires_at,
                    max_budget: req.max_budget,
                    soft_budget: None,
                    budget_duration: None,
                    tpm_limit: None,
                    rpm_limit: None,
                    max_parallel_requests: None,
                    per_model_limits: None,
                })
            }
        }
    }

    async fn missing_active_subscriptions(
        &self,
        user_id: &Uuid,
        model_ids: &[String],
    ) -> Result<Vec<String>, ApiError> {
        let mut missing = Vec::new();
        for model_id in model_ids {
            let subscription = self
                .subscriptions
                .find_by_user_and_model(user_id, model_id)
                .await?;
            let active = subscription
                .map(|s| s.status == sub_status::ACTIVE)
                .unwrap_or(false);
            if !active {
                missing.push(model_id.clone());
            }
        }
        Ok(missing)
    }

    async fn owned_key(&self, user_id: &Uuid, key_id: &Uuid) -> Result<api_key::Model, ApiError> {
        let key = self
            .keys
            .find_by_id(key_id)
            .await?
            .ok_or_else(|| not_found("API key", &key_id.to_string()))?;
        if key.user_id != *user_id {
            return Err(not_found("API key", &key_id.to_string()));
        }
        Ok(key)
    }

    async fn resolve_model_ids(&self, key: &api_key::Model) -> Result<Vec<String>, ApiError> {
        let linked = self.keys.model_ids_for_key(&key.id).await?;
        if !linked.is_empty() {
            return Ok(linked);
        }
        // Legacy key with no join rows: resolve through the subscription.
        if let Some(subscription_id) = key.subscription_id {
            if let Some(subscription) =
                self.subscriptions.find_by_id(&subscription_id).await?
            {
                return Ok(vec![subscription.model_id]);
            }
        }
        Ok(Vec::new())
    }

    /// Proxy-side alias: sanitized display name plus a random suffix. The
    /// display name may duplicate freely; the alias never collides.
    async fn unique_alias(&self, name: &str) -> Result<String, ApiError> {
        let base = sanitize_alias(name);
        for _ in 0..5 {
            let suffix: String = rand::thread_rng()
                .sample_iter(rand::distributions::Alphanumeric)
                .take(self.config.keys.alias_suffix_len)
                .map(|c| (c as char).to_ascii_lowercase())
                .collect();
            let alias = format!("{}-{}", base, suffix);
            if !self.keys.alias_exists(&alias).await? {
                return Ok(alias);
            }
        }
        Err(ApiError::from(anyhow::anyhow!(
            "could not derive a unique key alias for '{}'",
            name
        )))
    }

    /// Live spend for a key from the proxy; degrades to None when the proxy
    /// is unreachable since this is display-only enrichment.
    pub async fn get_key_spend(&self, user_id: Uuid, key_id: Uuid) -> Result<Option<f64>, ApiError> {
        let key = self.owned_key(&user_id, &key_id).await?;
        match self.proxy.get_key_info(&key.external_key_value).await {
            Ok(info) => Ok(Some(info.spend)),
            Err(ProxyError::Unavailable { message }) | Err(ProxyError::UnexpectedResponse { message }) => {
                tracing::warn!(key_id = %key_id, %message, "Could not fetch live spend, omitting");
                Ok(None)
            }
            Err(ProxyError::CircuitOpen) => {
                tracing::warn!(key_id = %key_id, "Could not fetch live spend, circuit open");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn display_prefix(secret: &str) -> String {
    secret.chars().take(10).collect()
}

fn mask_secret(secret: &str) -> String {
    let prefix = display_prefix(secret);
    let suffix: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}...{}", prefix, suffix)
}

fn sanitize_alias(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "key".to_string()
    } else {
        trimmed.chars().take(48).collect()
    }
}

fn duration_until(expires_at: DateTime<Utc>) -> String {
    let seconds = (expires_at - Utc::now()).num_seconds().max(60);
    format!("{}s", seconds)
}

fn is_expired(key: &api_key::Model) -> bool {
    key.expires_at
        .map(|at| at.with_timezone(&Utc) < Utc::now())
        .unwrap_or(false)
}

/// Pull per-model max_budget overrides out of the free-form limits map
fn extract_model_budgets(limits: Option<&JsonValue>) -> Option<BTreeMap<String, f64>> {
    let obj = limits?.as_object()?;
    let mut budgets = BTreeMap::new();
    for (model_id, entry) in obj {
        let budget = match entry {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::Object(fields) => fields.get("max_budget").and_then(JsonValue::as_f64),
            _ => None,
        };
        if let Some(budget) = budget {
            budgets.insert(model_id.clone(), budget);
        }
    }
    (!budgets.is_empty()).then_some(budgets)
}
