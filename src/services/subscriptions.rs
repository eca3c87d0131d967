//! Subscription restriction cascade and admin auto-provisioning
//!
//! When a model becomes restricted, standing access is demoted rather than
//! deleted: active subscriptions drop to pending and the model is stripped
//! from keys through the proxy-first removal path. Demotion never
//! auto-reverses; re-approval is a separate admin action.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SYSTEM_ACTOR_ID;
use crate::error::ApiError;
use crate::models::subscription::{self, status};
use crate::models::subscription_status_history;
use crate::repositories::SubscriptionRepository;
use crate::services::api_keys::{ApiKeyService, ModelRemovalReport};
use crate::services::AuditService;

const RESTRICTION_REASON: &str = "model became restricted";
const PROVISION_REASON: &str = "provisioned by admin";

/// Outcome of the restriction cascade for one model
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RestrictionCascadeReport {
    pub subscriptions_demoted: u64,
    pub key_removal: ModelRemovalReport,
}

/// What `ensure_active_subscriptions` did for one requested model
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvisionOutcome {
    pub model_id: String,
    /// created | reactivated | unchanged
    pub action: String,
    /// Previous status, for reactivations
    pub previous_status: Option<String>,
}

/// Subscription state transitions and admin auto-provisioning
#[derive(Clone)]
pub struct SubscriptionService {
    subscriptions: SubscriptionRepository,
    api_keys: Arc<ApiKeyService>,
    audit: AuditService,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: SubscriptionRepository,
        api_keys: Arc<ApiKeyService>,
        audit: AuditService,
    ) -> Self {
        Self {
            subscriptions,
            api_keys,
            audit,
        }
    }

    /// Demote every active subscription on a newly restricted model to
    /// pending and strip the model from keys at the enforcement layer.
    pub async fn apply_restriction_cascade(
        &self,
        model_id: &str,
        actor_id: Option<Uuid>,
    ) -> Result<RestrictionCascadeReport, ApiError> {
        let actor = actor_id.unwrap_or(SYSTEM_ACTOR_ID);
        let active = self
            .subscriptions
            .find_by_model_and_status(model_id, &[status::ACTIVE])
            .await?;

        let mut demoted = 0;
        for sub in &active {
            self.subscriptions
                .set_status(&sub.id, status::PENDING, Some(RESTRICTION_REASON), Some(actor))
                .await?;
            demoted += 1;
        }

        let key_removal = self.api_keys.remove_model_from_user_api_keys(model_id).await?;

        self.audit
            .record(
                Some(actor),
                "model.restriction_cascade",
                "model",
                model_id,
                Some(json!({
                    "subscriptions_demoted": demoted,
                    "keys_updated": key_removal.keys_updated,
                    "keys_deactivated": key_removal.keys_deactivated,
                })),
                key_removal.failed_key_ids.is_empty(),
            )
            .await;

        metrics::counter!("restriction_cascades_total").increment(1);

        Ok(RestrictionCascadeReport {
            subscriptions_demoted: demoted,
            key_removal,
        })
    }

    /// Admin auto-provisioning: make sure the user holds an active
    /// subscription for each requested model. Missing ones are created
    /// directly in active status; inactive ones are reactivated with their
    /// previous status recorded. The admin's explicit action stands in for
    /// the normal approval workflow.
    pub async fn ensure_active_subscriptions(
        &self,
        user_id: Uuid,
        model_ids: &[String],
        actor_id: Option<Uuid>,
    ) -> Result<Vec<ProvisionOutcome>, ApiError> {
        let actor = actor_id.unwrap_or(SYSTEM_ACTOR_ID);
        let mut outcomes = Vec::with_capacity(model_ids.len());

        for model_id in model_ids {
            let existing = self
                .subscriptions
                .find_by_user_and_model(&user_id, model_id)
                .await?;

            let outcome = match existing {
                None => {
                    let sub = self.create_active(user_id, model_id, actor).await?;
                    self.audit
                        .record(
                            Some(actor),
                            "subscription.provision",
                            "subscription",
                            &sub.id.to_string(),
                            Some(json!({ "model_id": model_id, "action": "created" })),
                            true,
                        )
                        .await;
                    ProvisionOutcome {
                        model_id: model_id.clone(),
                        action: "created".to_string(),
                        previous_status: None,
                    }
                }
                Some(sub) if sub.status != status::ACTIVE => {
                    let previous = sub.status.clone();
                    self.subscriptions
                        .set_status(&sub.id, status::ACTIVE, Some(PROVISION_REASON), Some(actor))
                        .await?;
                    self.audit
                        .record(
                            Some(actor),
                            "subscription.provision",
                            "subscription",
                            &sub.id.to_string(),
                            Some(json!({
                                "model_id": model_id,
                                "action": "reactivated",
                                "previous_status": previous,
                            })),
                            true,
                        )
                        .await;
                    ProvisionOutcome {
                        model_id: model_id.clone(),
                        action: "reactivated".to_string(),
                        previous_status: Some(previous),
                    }
                }
                Some(_) => ProvisionOutcome {
                    model_id: model_id.clone(),
                    action: "unchanged".to_string(),
                    previous_status: None,
                },
            };

            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    pub async fn list_user_subscriptions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<subscription::Model>, ApiError> {
        Ok(self.subscriptions.find_by_user(&user_id).await?)
    }

    pub async fn status_history(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<subscription_status_history::Model>, ApiError> {
        Ok(self.subscriptions.status_history(&subscription_id).await?)
    }

    async fn create_active(
        &self,
        user_id: Uuid,
        model_id: &str,
        actor: Uuid,
    ) -> Result<subscription::Model, ApiError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let sub = subscription::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            model_id: Set(model_id.to_string()),
            status: Set(status::ACTIVE.to_string()),
            status_reason: Set(Some(PROVISION_REASON.to_string())),
            status_changed_at: Set(Some(now.into())),
            status_changed_by: Set(Some(actor)),
            requests_used: Set(0),
            requests_allotted: Set(None),
            tokens_used: Set(0),
            tokens_allotted: Set(None),
            max_budget: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let created = self.subscriptions.create(sub).await?;

        let history = subscription_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            subscription_id: Set(id),
            old_status: Set(None),
            new_status: Set(status::ACTIVE.to_string()),
            reason: Set(Some(PROVISION_REASON.to_string())),
            changed_by: Set(Some(actor)),
            changed_at: Set(now.into()),
        };
        history.insert(&*self.subscriptions.db).await?;

        Ok(created)
    }
}
