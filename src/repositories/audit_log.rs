//! Audit log repository for database operations

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::audit_log::{self, Entity as AuditLog};

/// Repository for audit log database operations
#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl AuditLogRepository {
    /// Creates a new AuditLogRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Appends one audit entry
    pub async fn record(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: Option<JsonValue>,
        success: bool,
    ) -> Result<audit_log::Model> {
        let entry = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            actor_id: Set(actor_id),
            action: Set(action.to_string()),
            resource_type: Set(resource_type.to_string()),
            resource_id: Set(resource_id.to_string()),
            metadata: Set(metadata),
            success: Set(success),
            created_at: Set(Utc::now().into()),
        };

        Ok(entry.insert(&*self.db).await?)
    }

    /// Most recent entries, newest first
    pub async fn list_recent(&self, limit: u64) -> Result<Vec<audit_log::Model>> {
        Ok(AuditLog::find()
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Entries touching one resource, newest first
    pub async fn list_by_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        limit: u64,
    ) -> Result<Vec<audit_log::Model>> {
        Ok(AuditLog::find()
            .filter(audit_log::Column::ResourceType.eq(resource_type))
            .filter(audit_log::Column::ResourceId.eq(resource_id))
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}
