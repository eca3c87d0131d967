//! Model synchronization engine
//!
//! Reconciles the local catalog against the proxy's live model list and owns
//! the transactional unavailability cascade. Sync is a bulk operation: it
//! reports partial progress through a result object instead of failing the
//! whole run on one bad model.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SYSTEM_ACTOR_ID;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::api_key::{self, Entity as ApiKey};
use crate::models::api_key_model::{self, Entity as ApiKeyModel};
use crate::models::audit_log;
use crate::models::model::{
    self, AVAILABILITY_AVAILABLE, AVAILABILITY_UNAVAILABLE, Entity as LlmModel,
};
use crate::models::subscription::{self, Entity as Subscription, status as sub_status};
use crate::models::subscription_status_history;
use crate::proxy::{ProxyClient, ProxyError, ProxyModel};
use crate::repositories::ModelRepository;
use crate::services::{AuditService, SubscriptionService};

const PRICE_EPSILON: f64 = 1e-9;
const UNAVAILABLE_REASON: &str = "model unavailable on proxy";

/// Side-effect counts from unavailability cascades
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CascadeStats {
    pub subscriptions_deactivated: u64,
    pub key_links_removed: u64,
    pub keys_deactivated: u64,
}

impl CascadeStats {
    fn absorb(&mut self, other: CascadeStats) {
        self.subscriptions_deactivated += other.subscriptions_deactivated;
        self.key_links_removed += other.key_links_removed;
        self.keys_deactivated += other.keys_deactivated;
    }
}

/// Result of one sync run; `success` is false when any per-model step failed
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SyncReport {
    pub success: bool,
    pub total_models: u64,
    pub new_models: u64,
    pub updated_models: u64,
    pub unavailable_models: u64,
    pub cascade: CascadeStats,
    pub errors: Vec<String>,
}

/// One catalog entry failing the integrity check
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelIssue {
    pub model_id: String,
    pub problems: Vec<String>,
}

/// Integrity report; informational only, nothing is auto-repaired
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ValidationReport {
    pub invalid_models: Vec<ModelIssue>,
    pub active_subscriptions_on_unavailable: u64,
}

/// Catalog counters for status endpoints
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncStats {
    pub total_models: u64,
    pub available_models: u64,
    pub unavailable_models: u64,
    pub last_synced_at: Option<chrono::DateTime<Utc>>,
    pub proxy_circuit_open: bool,
}

/// Outcome of a restriction toggle
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RestrictionChange {
    pub model_id: String,
    pub restricted_access: bool,
    pub previous: bool,
    pub subscriptions_demoted: u64,
}

/// Admin payload for catalog create/update
#[derive(Debug, Clone, serde::Deserialize, ToSchema)]
pub struct ModelDefinition {
    pub provider: String,
    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,
    #[serde(default)]
    pub context_length: Option<i32>,
    #[serde(default)]
    pub supports_vision: bool,
    #[serde(default)]
    pub supports_function_calling: bool,
    #[serde(default)]
    pub supports_parallel_function_calling: bool,
    #[serde(default)]
    pub supports_tool_choice: bool,
    #[serde(default)]
    pub restricted_access: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reconciliation and cascade engine for the model catalog
#[derive(Clone)]
pub struct ModelSyncService {
    db: Arc<DatabaseConnection>,
    models: ModelRepository,
    proxy: Arc<ProxyClient>,
    subscriptions: Arc<SubscriptionService>,
    audit: AuditService,
}

impl ModelSyncService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        proxy: Arc<ProxyClient>,
        subscriptions: Arc<SubscriptionService>,
        audit: AuditService,
    ) -> Self {
        Self {
            models: ModelRepository::new(Arc::clone(&db)),
            db,
            proxy,
            subscriptions,
            audit,
        }
    }

    /// Reconcile the catalog against the proxy's live list.
    ///
    /// `force_update` rewrites existing rows even when the field diff shows
    /// no change. `mark_unavailable` controls whether locally-available
    /// models absent from the proxy are cascaded unavailable; note an empty
    /// proxy list with this flag set deactivates the entire catalog.
    pub async fn sync_models(
        &self,
        force_update: bool,
        mark_unavailable: bool,
    ) -> Result<SyncReport, ApiError> {
        let mut report = SyncReport::default();

        let remote = match self.proxy.get_models(true).await {
            Ok(models) => models,
            Err(err) => {
                report.errors.push(format!("model list fetch failed: {}", err));
                self.record_sync_audit(&report).await;
                return Ok(report);
            }
        };

        report.total_models = remote.len() as u64;

        let local: HashMap<String, model::Model> = self
            .models
            .find_all()
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let now = Utc::now();
        let mut unchanged: Vec<String> = Vec::new();

        for entry in &remote {
            match local.get(&entry.name) {
                None => {
                    if let Err(err) = self.insert_from_proxy(entry).await {
                        report.errors.push(format!("insert {}: {}", entry.name, err));
                    } else {
                        report.new_models += 1;
                    }
                }
                Some(existing) => {
                    if force_update || models_differ(existing, entry) {
                        if let Err(err) = self.update_from_proxy(existing, entry).await {
                            report.errors.push(format!("update {}: {}", entry.name, err));
                        } else {
                            report.updated_models += 1;
                        }
                    } else {
                        unchanged.push(existing.id.clone());
                    }
                }
            }
        }

        // Untouched rows still get their sync timestamp, in one statement.
        if let Err(err) = self.models.touch_synced(&unchanged, now.into()).await {
            report.errors.push(format!("touch unchanged: {}", err));
        }

        if mark_unavailable {
            let remote_names: std::collections::HashSet<&str> =
                remote.iter().map(|m| m.name.as_str()).collect();

            for (id, existing) in &local {
                if existing.availability == AVAILABILITY_AVAILABLE
                    && !remote_names.contains(id.as_str())
                {
                    match self.mark_model_unavailable(id, None).await {
                        Ok(stats) => {
                            report.unavailable_models += 1;
                            report.cascade.absorb(stats);
                        }
                        Err(err) => {
                            report
                                .errors
                                .push(format!("mark unavailable {}: {}", id, err.message));
                        }
                    }
                }
            }
        }

        report.success = report.errors.is_empty();

        metrics::counter!("model_sync_runs_total").increment(1);
        metrics::counter!("model_sync_new_models_total").increment(report.new_models);
        metrics::counter!("model_sync_unavailable_models_total")
            .increment(report.unavailable_models);

        self.record_sync_audit(&report).await;
        Ok(report)
    }

    async fn record_sync_audit(&self, report: &SyncReport) {
        self.audit
            .record(
                None,
                "model.sync",
                "model",
                "catalog",
                serde_json::to_value(report).ok(),
                report.success,
            )
            .await;
    }

    async fn insert_from_proxy(&self, entry: &ProxyModel) -> anyhow::Result<()> {
        let now = Utc::now();
        let row = model::ActiveModel {
            id: Set(entry.name.clone()),
            provider: Set(entry.provider.clone()),
            input_cost_per_token: Set(entry.input_cost_per_token),
            output_cost_per_token: Set(entry.output_cost_per_token),
            context_length: Set(entry.context_length),
            supports_vision: Set(entry.supports_vision),
            supports_function_calling: Set(entry.supports_function_calling),
            supports_parallel_function_calling: Set(entry.supports_parallel_function_calling),
            supports_tool_choice: Set(entry.supports_tool_choice),
            availability: Set(AVAILABILITY_AVAILABLE.to_string()),
            restricted_access: Set(false),
            external_model_id: Set(entry.external_id.clone()),
            description: Set(entry.description.clone()),
            last_synced_at: Set(Some(now.into())),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        self.models.create(row).await?;
        Ok(())
    }

    async fn update_from_proxy(
        &self,
        existing: &model::Model,
        entry: &ProxyModel,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut active: model::ActiveModel = existing.clone().into();
        active.provider = Set(entry.provider.clone());
        active.input_cost_per_token = Set(entry.input_cost_per_token);
        active.output_cost_per_token = Set(entry.output_cost_per_token);
        active.context_length = Set(entry.context_length);
        active.supports_vision = Set(entry.supports_vision);
        active.supports_function_calling = Set(entry.supports_function_calling);
        active.supports_parallel_function_calling = Set(entry.supports_parallel_function_calling);
        active.supports_tool_choice = Set(entry.supports_tool_choice);
        active.availability = Set(AVAILABILITY_AVAILABLE.to_string());
        active.external_model_id = Set(entry.external_id.clone());
        // Admin-entered description wins; only fill it when locally empty.
        if existing.description.is_none() {
            active.description = Set(entry.description.clone());
        }
        active.last_synced_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        self.models.update(active).await?;
        Ok(())
    }

    /// Flip a model unavailable and cascade, all inside one transaction:
    /// active subscriptions go inactive, join rows referencing the model are
    /// deleted, keys left with zero associations are deactivated, and a
    /// single audit record summarizes the counts. Already-unavailable models
    /// skip the cascade entirely so repeated sync runs stay idempotent.
    pub async fn mark_model_unavailable(
        &self,
        model_id: &str,
        actor_id: Option<Uuid>,
    ) -> Result<CascadeStats, ApiError> {
        match self.run_unavailability_cascade(model_id, actor_id).await {
            Ok(stats) => Ok(stats),
            Err(err) => {
                self.audit
                    .record(
                        actor_id,
                        "model.mark_unavailable",
                        "model",
                        model_id,
                        Some(json!({ "error": err.message })),
                        false,
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn run_unavailability_cascade(
        &self,
        model_id: &str,
        actor_id: Option<Uuid>,
    ) -> Result<CascadeStats, ApiError> {
        let actor = actor_id.unwrap_or(SYSTEM_ACTOR_ID);
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let existing = LlmModel::find_by_id(model_id)
            .one(&txn)
            .await?
            .ok_or_else(|| not_found("Model", model_id))?;

        if existing.availability == AVAILABILITY_UNAVAILABLE {
            txn.commit().await?;
            tracing::debug!(model_id, "Model already unavailable, skipping cascade");
            return Ok(CascadeStats::default());
        }

        let mut active_model: model::ActiveModel = existing.into();
        active_model.availability = Set(AVAILABILITY_UNAVAILABLE.to_string());
        active_model.updated_at = Set(now.into());
        active_model.update(&txn).await?;

        let mut stats = CascadeStats::default();

        let subs = Subscription::find()
            .filter(subscription::Column::ModelId.eq(model_id))
            .filter(subscription::Column::Status.eq(sub_status::ACTIVE))
            .all(&txn)
            .await?;
        for sub in subs {
            let sub_id = sub.id;
            let old_status = sub.status.clone();

            let mut active_sub: subscription::ActiveModel = sub.into();
            active_sub.status = Set(sub_status::INACTIVE.to_string());
            active_sub.status_reason = Set(Some(UNAVAILABLE_REASON.to_string()));
            active_sub.status_changed_at = Set(Some(now.into()));
            active_sub.status_changed_by = Set(Some(actor));
            active_sub.updated_at = Set(now.into());
            active_sub.update(&txn).await?;

            let history = subscription_status_history::ActiveModel {
                id: Set(Uuid::new_v4()),
                subscription_id: Set(sub_id),
                old_status: Set(Some(old_status)),
                new_status: Set(sub_status::INACTIVE.to_string()),
                reason: Set(Some(UNAVAILABLE_REASON.to_string())),
                changed_by: Set(Some(actor)),
                changed_at: Set(now.into()),
            };
            history.insert(&txn).await?;

            stats.subscriptions_deactivated += 1;
        }

        let links = ApiKeyModel::find()
            .filter(api_key_model::Column::ModelId.eq(model_id))
            .all(&txn)
            .await?;
        let touched_keys: Vec<Uuid> = links.iter().map(|l| l.api_key_id).collect();

        let deleted = ApiKeyModel::delete_many()
            .filter(api_key_model::Column::ModelId.eq(model_id))
            .exec(&txn)
            .await?;
        stats.key_links_removed = deleted.rows_affected;

        for key_id in touched_keys {
            let remaining = ApiKeyModel::find()
                .filter(api_key_model::Column::ApiKeyId.eq(key_id))
                .count(&txn)
                .await?;
            if remaining == 0 {
                if let Some(key) = ApiKey::find_by_id(key_id).one(&txn).await? {
                    if key.is_active {
                        let mut active_key: api_key::ActiveModel = key.into();
                        active_key.is_active = Set(false);
                        active_key.revoked_at = Set(Some(now.into()));
                        active_key.updated_at = Set(now.into());
                        active_key.update(&txn).await?;
                        stats.keys_deactivated += 1;
                    }
                }
            }
        }

        let audit_entry = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            actor_id: Set(Some(actor)),
            action: Set("model.mark_unavailable".to_string()),
            resource_type: Set("model".to_string()),
            resource_id: Set(model_id.to_string()),
            metadata: Set(Some(json!({
                "subscriptions_deactivated": stats.subscriptions_deactivated,
                "key_links_removed": stats.key_links_removed,
                "keys_deactivated": stats.keys_deactivated,
            }))),
            success: Set(true),
            created_at: Set(now.into()),
        };
        audit_entry.insert(&txn).await?;

        txn.commit().await?;

        tracing::info!(
            model_id,
            subscriptions = stats.subscriptions_deactivated,
            links = stats.key_links_removed,
            keys = stats.keys_deactivated,
            "Unavailability cascade applied"
        );

        Ok(stats)
    }

    /// Integrity check: models with missing required fields plus a count of
    /// active subscriptions pointing at unavailable models. Reports only.
    pub async fn validate_models(&self) -> Result<ValidationReport, ApiError> {
        let mut report = ValidationReport::default();

        for entry in self.models.find_all().await? {
            let mut problems = Vec::new();
            if entry.provider.trim().is_empty() {
                problems.push("provider is empty".to_string());
            }
            if entry.input_cost_per_token < 0.0 || entry.output_cost_per_token < 0.0 {
                problems.push("negative token pricing".to_string());
            }
            if entry.availability != AVAILABILITY_AVAILABLE
                && entry.availability != AVAILABILITY_UNAVAILABLE
            {
                problems.push(format!("unknown availability '{}'", entry.availability));
            }

            if entry.availability == AVAILABILITY_UNAVAILABLE {
                report.active_subscriptions_on_unavailable += Subscription::find()
                    .filter(subscription::Column::ModelId.eq(&entry.id))
                    .filter(subscription::Column::Status.eq(sub_status::ACTIVE))
                    .count(&*self.db)
                    .await?;
            }

            if !problems.is_empty() {
                report.invalid_models.push(ModelIssue {
                    model_id: entry.id,
                    problems,
                });
            }
        }

        Ok(report)
    }

    /// Toggle the restriction flag. A false→true flip triggers the
    /// restriction cascade; flipping back has no automatic effect on
    /// subscriptions. The change is always audit-logged with the previous
    /// value.
    pub async fn update_model_restriction(
        &self,
        model_id: &str,
        restricted: bool,
        actor_id: Option<Uuid>,
    ) -> Result<RestrictionChange, ApiError> {
        let existing = self
            .models
            .find_by_id(model_id)
            .await?
            .ok_or_else(|| not_found("Model", model_id))?;

        let previous = existing.restricted_access;

        let mut active: model::ActiveModel = existing.into();
        active.restricted_access = Set(restricted);
        active.updated_at = Set(Utc::now().into());
        self.models.update(active).await?;

        let mut subscriptions_demoted = 0;
        if previous != restricted && restricted {
            let cascade = self
                .subscriptions
                .apply_restriction_cascade(model_id, actor_id)
                .await?;
            subscriptions_demoted = cascade.subscriptions_demoted;
        }

        self.audit
            .record(
                actor_id,
                "model.update_restriction",
                "model",
                model_id,
                Some(json!({
                    "restricted_access": restricted,
                    "previous": previous,
                    "subscriptions_demoted": subscriptions_demoted,
                })),
                true,
            )
            .await;

        Ok(RestrictionChange {
            model_id: model_id.to_string(),
            restricted_access: restricted,
            previous,
            subscriptions_demoted,
        })
    }

    /// Catalog counters for the status endpoint
    pub async fn get_sync_stats(&self) -> Result<SyncStats, ApiError> {
        let stats = self.models.catalog_stats().await?;
        Ok(SyncStats {
            total_models: stats.total,
            available_models: stats.available,
            unavailable_models: stats.unavailable,
            last_synced_at: stats.last_synced_at.map(|at| at.with_timezone(&Utc)),
            proxy_circuit_open: self.proxy.circuit_open(),
        })
    }

    // --- admin catalog writes (proxy first, settle delay inside the client) ---

    /// Register a model on the proxy and mirror it locally.
    pub async fn create_model(
        &self,
        model_id: &str,
        definition: ModelDefinition,
        actor_id: Option<Uuid>,
    ) -> Result<model::Model, ApiError> {
        if self.models.find_by_id(model_id).await?.is_some() {
            return Err(validation_error(
                "Model already exists",
                json!({ "model_id": model_id }),
            ));
        }

        self.proxy
            .create_model(&proxy_model_payload(model_id, &definition))
            .await?;

        // Pick up the proxy's internal id for the new model.
        let external_model_id = self
            .proxy
            .get_models(true)
            .await
            .ok()
            .and_then(|models| {
                models
                    .into_iter()
                    .find(|m| m.name == model_id)
                    .and_then(|m| m.external_id)
            });

        let now = Utc::now();
        let row = model::ActiveModel {
            id: Set(model_id.to_string()),
            provider: Set(definition.provider.clone()),
            input_cost_per_token: Set(definition.input_cost_per_token),
            output_cost_per_token: Set(definition.output_cost_per_token),
            context_length: Set(definition.context_length),
            supports_vision: Set(definition.supports_vision),
            supports_function_calling: Set(definition.supports_function_calling),
            supports_parallel_function_calling: Set(definition.supports_parallel_function_calling),
            supports_tool_choice: Set(definition.supports_tool_choice),
            availability: Set(AVAILABILITY_AVAILABLE.to_string()),
            restricted_access: Set(definition.restricted_access),
            external_model_id: Set(external_model_id),
            description: Set(definition.description.clone()),
            last_synced_at: Set(Some(now.into())),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let created = self.models.create(row).await?;

        self.audit
            .record(
                actor_id,
                "model.create",
                "model",
                model_id,
                Some(json!({ "provider": definition.provider })),
                true,
            )
            .await;

        Ok(created)
    }

    /// Update a model on the proxy, then locally.
    pub async fn update_model(
        &self,
        model_id: &str,
        definition: ModelDefinition,
        actor_id: Option<Uuid>,
    ) -> Result<model::Model, ApiError> {
        let existing = self
            .models
            .find_by_id(model_id)
            .await?
            .ok_or_else(|| not_found("Model", model_id))?;

        let external_id = existing.external_model_id.clone().ok_or_else(|| {
            validation_error(
                "Model has no proxy-side identifier; run a sync first",
                json!({ "model_id": model_id }),
            )
        })?;

        self.proxy
            .update_model(&external_id, &proxy_model_payload(model_id, &definition))
            .await?;

        let mut active: model::ActiveModel = existing.into();
        active.provider = Set(definition.provider.clone());
        active.input_cost_per_token = Set(definition.input_cost_per_token);
        active.output_cost_per_token = Set(definition.output_cost_per_token);
        active.context_length = Set(definition.context_length);
        active.supports_vision = Set(definition.supports_vision);
        active.supports_function_calling = Set(definition.supports_function_calling);
        active.supports_parallel_function_calling = Set(definition.supports_parallel_function_calling);
        active.supports_tool_choice = Set(definition.supports_tool_choice);
        if definition.description.is_some() {
            active.description = Set(definition.description.clone());
        }
        active.updated_at = Set(Utc::now().into());
        let updated = self.models.update(active).await?;

        self.audit
            .record(actor_id, "model.update", "model", model_id, None, true)
            .await;

        Ok(updated)
    }

    /// Delete a model: proxy first, then the local row. Dependent join rows
    /// and subscriptions go with it via foreign-key cascade; their counts are
    /// recorded in the audit entry.
    pub async fn delete_model(
        &self,
        model_id: &str,
        actor_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let existing = self
            .models
            .find_by_id(model_id)
            .await?
            .ok_or_else(|| not_found("Model", model_id))?;

        if let Some(external_id) = &existing.external_model_id {
            match self.proxy.delete_model(external_id).await {
                Ok(()) => {}
                Err(ProxyError::Validation { status: 404, .. }) => {
                    tracing::debug!(model_id, "Model already absent on proxy");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let purged_links = ApiKeyModel::find()
            .filter(api_key_model::Column::ModelId.eq(model_id))
            .count(&*self.db)
            .await?;
        let purged_subscriptions = Subscription::find()
            .filter(subscription::Column::ModelId.eq(model_id))
            .count(&*self.db)
            .await?;

        self.models.delete_by_id(model_id).await?;

        self.audit
            .record(
                actor_id,
                "model.delete",
                "model",
                model_id,
                Some(json!({
                    "purged_key_links": purged_links,
                    "purged_subscriptions": purged_subscriptions,
                })),
                true,
            )
            .await;

        Ok(())
    }
}

/// Field-level diff between a catalog row and the proxy's view of the same
/// model. Pricing compares within epsilon; the proxy's internal id is part of
/// the diff so a delete-and-recreate under the same name is detected even
/// when every visible field matches.
fn models_differ(local: &model::Model, remote: &ProxyModel) -> bool {
    if (local.input_cost_per_token - remote.input_cost_per_token).abs() > PRICE_EPSILON {
        return true;
    }
    if (local.output_cost_per_token - remote.output_cost_per_token).abs() > PRICE_EPSILON {
        return true;
    }
    local.provider != remote.provider
        || local.context_length != remote.context_length
        || local.supports_vision != remote.supports_vision
        || local.supports_function_calling != remote.supports_function_calling
        || local.supports_parallel_function_calling != remote.supports_parallel_function_calling
        || local.supports_tool_choice != remote.supports_tool_choice
        || local.external_model_id != remote.external_id
        || local.availability != AVAILABILITY_AVAILABLE
}

fn proxy_model_payload(model_id: &str, definition: &ModelDefinition) -> JsonValue {
    json!({
        "model_name": model_id,
        "litellm_params": {
            "model": format!("{}/{}", definition.provider, model_id),
        },
        "model_info": {
            "litellm_provider": definition.provider,
            "input_cost_per_token": definition.input_cost_per_token,
            "output_cost_per_token": definition.output_cost_per_token,
            "max_input_tokens": definition.context_length,
            "supports_vision": definition.supports_vision,
            "supports_function_calling": definition.supports_function_calling,
            "supports_parallel_function_calling": definition.supports_parallel_function_calling,
            "supports_tool_choice": definition.supports_tool_choice,
            "description": definition.description,
        },
    })
}
