//! Model catalog repository for database operations

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, sea_query::Expr,
};
use std::sync::Arc;

use crate::models::model::{self, AVAILABILITY_AVAILABLE, AVAILABILITY_UNAVAILABLE, Entity as LlmModel};

/// Aggregate counts over the model catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogStats {
    pub total: u64,
    pub available: u64,
    pub unavailable: u64,
    pub last_synced_at: Option<sea_orm::prelude::DateTimeWithTimeZone>,
}

/// Repository for model catalog database operations
#[derive(Debug, Clone)]
pub struct ModelRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ModelRepository {
    /// Creates a new ModelRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists the full catalog ordered by id
    pub async fn find_all(&self) -> Result<Vec<model::Model>> {
        Ok(LlmModel::find()
            .order_by_asc(model::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<model::Model>> {
        Ok(LlmModel::find_by_id(id).one(&*self.db).await?)
    }

    /// Lists catalog entries with the given availability, ordered by id
    pub async fn find_by_availability(&self, availability: &str) -> Result<Vec<model::Model>> {
        Ok(LlmModel::find()
            .filter(model::Column::Availability.eq(availability))
            .order_by_asc(model::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Creates a new catalog entry
    pub async fn create(&self, entry: model::ActiveModel) -> Result<model::Model> {
        let id = entry
            .id
            .clone()
            .take()
            .ok_or_else(|| anyhow!("model id must be set"))?;

        entry.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = LlmModel::find_by_id(&id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("model not persisted"))
    }

    /// Applies a prepared update
    pub async fn update(&self, entry: model::ActiveModel) -> Result<model::Model> {
        Ok(entry.update(&*self.db).await?)
    }

    /// Stamps `last_synced_at` on the given models in one statement
    pub async fn touch_synced(
        &self,
        ids: &[String],
        at: sea_orm::prelude::DateTimeWithTimeZone,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = LlmModel::update_many()
            .col_expr(model::Column::LastSyncedAt, Expr::value(Some(at)))
            .filter(model::Column::Id.is_in(ids.iter().map(String::as_str)))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Flips a model's availability, stamping the change time
    pub async fn set_availability(&self, id: &str, availability: &str) -> Result<model::Model> {
        let existing = LlmModel::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Model '{}' not found", id))?;

        let mut active: model::ActiveModel = existing.into();
        active.availability = Set(availability.to_string());
        active.updated_at = Set(Utc::now().into());

        Ok(active.update(&*self.db).await?)
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        let result = LlmModel::delete_by_id(id).exec(&*self.db).await?;

        if result.rows_affected == 0 {
            return Err(anyhow!("Model '{}' not found", id));
        }

        Ok(())
    }

    /// Availability counts plus the most recent sync timestamp
    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        let total = LlmModel::find().count(&*self.db).await?;
        let available = LlmModel::find()
            .filter(model::Column::Availability.eq(AVAILABILITY_AVAILABLE))
            .count(&*self.db)
            .await?;
        let unavailable = LlmModel::find()
            .filter(model::Column::Availability.eq(AVAILABILITY_UNAVAILABLE))
            .count(&*self.db)
            .await?;

        let last_synced_at = LlmModel::find()
            .filter(model::Column::LastSyncedAt.is_not_null())
            .order_by_desc(model::Column::LastSyncedAt)
            .one(&*self.db)
            .await?
            .and_then(|m| m.last_synced_at);

        Ok(CatalogStats {
            total,
            available,
            unavailable,
            last_synced_at,
        })
    }
}
