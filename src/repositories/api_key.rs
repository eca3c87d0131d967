//! API key repository for database operations

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::api_key::{self, Entity as ApiKey};
use crate::models::api_key_model::{self, Entity as ApiKeyModel};

/// Repository for API key database operations
#[derive(Debug, Clone)]
pub struct ApiKeyRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ApiKeyRepository {
    /// Creates a new ApiKeyRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<api_key::Model>> {
        Ok(ApiKey::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists a user's keys ordered by creation time
    pub async fn find_by_user(&self, user_id: &Uuid) -> Result<Vec<api_key::Model>> {
        Ok(ApiKey::find()
            .filter(api_key::Column::UserId.eq(*user_id))
            .order_by_asc(api_key::Column::CreatedAt)
            .order_by_asc(api_key::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Number of active keys a user currently holds
    pub async fn count_active_by_user(&self, user_id: &Uuid) -> Result<u64> {
        Ok(ApiKey::find()
            .filter(api_key::Column::UserId.eq(*user_id))
            .filter(api_key::Column::IsActive.eq(true))
            .count(&*self.db)
            .await?)
    }

    /// Looks a key up by the sha256 hash of its secret
    pub async fn find_by_key_hash(&self, key_hash: &str) -> Result<Option<api_key::Model>> {
        Ok(ApiKey::find()
            .filter(api_key::Column::KeyHash.eq(key_hash))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_by_alias(&self, alias: &str) -> Result<Option<api_key::Model>> {
        Ok(ApiKey::find()
            .filter(api_key::Column::ExternalKeyAlias.eq(alias))
            .one(&*self.db)
            .await?)
    }

    pub async fn alias_exists(&self, alias: &str) -> Result<bool> {
        Ok(self.find_by_alias(alias).await?.is_some())
    }

    /// Lists every key, active or not. Used by maintenance jobs.
    pub async fn find_all(&self) -> Result<Vec<api_key::Model>> {
        Ok(ApiKey::find()
            .order_by_asc(api_key::Column::CreatedAt)
            .order_by_asc(api_key::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Creates a new API key record
    pub async fn create(&self, key: api_key::ActiveModel) -> Result<api_key::Model> {
        let id = key
            .id
            .clone()
            .take()
            .ok_or_else(|| anyhow!("api key id must be set"))?;

        key.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = ApiKey::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("api key not persisted"))
    }

    /// Applies a prepared update
    pub async fn update(&self, key: api_key::ActiveModel) -> Result<api_key::Model> {
        Ok(key.update(&*self.db).await?)
    }

    /// Deactivates a key, recording the revocation time
    pub async fn deactivate(&self, id: &Uuid) -> Result<api_key::Model> {
        let existing = ApiKey::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("API key '{}' not found", id))?;

        let now = Utc::now();
        let mut active: api_key::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.revoked_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());

        Ok(active.update(&*self.db).await?)
    }

    /// Records the outcome of a proxy sync attempt
    pub async fn set_sync_status(
        &self,
        id: &Uuid,
        sync_status: &str,
        sync_error: Option<&str>,
    ) -> Result<api_key::Model> {
        let existing = ApiKey::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("API key '{}' not found", id))?;

        let mut active: api_key::ActiveModel = existing.into();
        active.sync_status = Set(sync_status.to_string());
        active.sync_error = Set(sync_error.map(str::to_string));
        active.updated_at = Set(Utc::now().into());

        Ok(active.update(&*self.db).await?)
    }

    // --- model associations ---

    /// Model ids currently linked to a key
    pub async fn model_ids_for_key(&self, api_key_id: &Uuid) -> Result<Vec<String>> {
        Ok(ApiKeyModel::find()
            .filter(api_key_model::Column::ApiKeyId.eq(*api_key_id))
            .order_by_asc(api_key_model::Column::ModelId)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|link| link.model_id)
            .collect())
    }

    /// Links a key to each of the given models
    pub async fn add_model_links(&self, api_key_id: &Uuid, model_ids: &[String]) -> Result<()> {
        for model_id in model_ids {
            let link = api_key_model::ActiveModel {
                api_key_id: Set(*api_key_id),
                model_id: Set(model_id.clone()),
                created_at: Set(Utc::now().into()),
            };
            link.insert(&*self.db).await?;
        }
        Ok(())
    }

    /// Removes one key/model link; returns whether a row was deleted
    pub async fn remove_model_link(&self, api_key_id: &Uuid, model_id: &str) -> Result<bool> {
        let result = ApiKeyModel::delete_many()
            .filter(api_key_model::Column::ApiKeyId.eq(*api_key_id))
            .filter(api_key_model::Column::ModelId.eq(model_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Replaces a key's model links with the given set, all-or-nothing
    pub async fn replace_model_links(
        &self,
        api_key_id: &Uuid,
        model_ids: &[String],
    ) -> Result<()> {
        let txn = self.db.begin().await?;

        ApiKeyModel::delete_many()
            .filter(api_key_model::Column::ApiKeyId.eq(*api_key_id))
            .exec(&txn)
            .await?;

        for model_id in model_ids {
            let link = api_key_model::ActiveModel {
                api_key_id: Set(*api_key_id),
                model_id: Set(model_id.clone()),
                created_at: Set(Utc::now().into()),
            };
            link.insert(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Keys linked to a model, active keys only
    pub async fn find_active_keys_for_model(&self, model_id: &str) -> Result<Vec<api_key::Model>> {
        let links = ApiKeyModel::find()
            .filter(api_key_model::Column::ModelId.eq(model_id))
            .all(&*self.db)
            .await?;

        let mut keys = Vec::with_capacity(links.len());
        for link in links {
            if let Some(key) = ApiKey::find_by_id(link.api_key_id).one(&*self.db).await? {
                if key.is_active {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}
