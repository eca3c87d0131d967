//! Subscription repository for database operations
//!
//! Subscriptions are never hard-deleted; status transitions are the only
//! mutation, and every transition is mirrored into
//! subscription_status_history by the caller's transaction.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::subscription::{self, Entity as Subscription};
use crate::models::subscription_status_history::{self, Entity as SubscriptionStatusHistory};

/// Repository for subscription database operations
#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl SubscriptionRepository {
    /// Creates a new SubscriptionRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<subscription::Model>> {
        Ok(Subscription::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists a user's subscriptions ordered by creation time
    pub async fn find_by_user(&self, user_id: &Uuid) -> Result<Vec<subscription::Model>> {
        Ok(Subscription::find()
            .filter(subscription::Column::UserId.eq(*user_id))
            .order_by_asc(subscription::Column::CreatedAt)
            .order_by_asc(subscription::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Finds the unique subscription for a user/model pair
    pub async fn find_by_user_and_model(
        &self,
        user_id: &Uuid,
        model_id: &str,
    ) -> Result<Option<subscription::Model>> {
        Ok(Subscription::find()
            .filter(subscription::Column::UserId.eq(*user_id))
            .filter(subscription::Column::ModelId.eq(model_id))
            .one(&*self.db)
            .await?)
    }

    /// Lists subscriptions to a model with any of the given statuses
    pub async fn find_by_model_and_status(
        &self,
        model_id: &str,
        statuses: &[&str],
    ) -> Result<Vec<subscription::Model>> {
        Ok(Subscription::find()
            .filter(subscription::Column::ModelId.eq(model_id))
            .filter(
                subscription::Column::Status.is_in(statuses.iter().map(|s| s.to_string())),
            )
            .order_by_asc(subscription::Column::CreatedAt)
            .order_by_asc(subscription::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Creates a new subscription record
    pub async fn create(&self, sub: subscription::ActiveModel) -> Result<subscription::Model> {
        let id = sub
            .id
            .clone()
            .take()
            .ok_or_else(|| anyhow!("subscription id must be set"))?;

        sub.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = Subscription::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("subscription not persisted"))
    }

    /// Transitions a subscription's status and appends the matching history
    /// entry. No-op when the status is already the target value.
    pub async fn set_status(
        &self,
        id: &Uuid,
        new_status: &str,
        reason: Option<&str>,
        changed_by: Option<Uuid>,
    ) -> Result<subscription::Model> {
        let existing = Subscription::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Subscription '{}' not found", id))?;

        if existing.status == new_status {
            return Ok(existing);
        }

        let now = Utc::now();
        let old_status = existing.status.clone();

        let mut active: subscription::ActiveModel = existing.into();
        active.status = Set(new_status.to_string());
        active.status_reason = Set(reason.map(str::to_string));
        active.status_changed_at = Set(Some(now.into()));
        active.status_changed_by = Set(changed_by);
        active.updated_at = Set(now.into());
        let updated = active.update(&*self.db).await?;

        let history = subscription_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            subscription_id: Set(*id),
            old_status: Set(Some(old_status)),
            new_status: Set(new_status.to_string()),
            reason: Set(reason.map(str::to_string)),
            changed_by: Set(changed_by),
            changed_at: Set(now.into()),
        };
        history.insert(&*self.db).await?;

        Ok(updated)
    }

    /// Lists the status history for a subscription, newest first
    pub async fn status_history(
        &self,
        subscription_id: &Uuid,
    ) -> Result<Vec<subscription_status_history::Model>> {
        Ok(SubscriptionStatusHistory::find()
            .filter(subscription_status_history::Column::SubscriptionId.eq(*subscription_id))
            .order_by_desc(subscription_status_history::Column::ChangedAt)
            .all(&*self.db)
            .await?)
    }
}
