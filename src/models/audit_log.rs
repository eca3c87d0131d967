//! Audit log entity model
//!
//! Fire-and-forget audit trail; the control plane writes entries but never
//! reads them back on any decision path.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// One recorded admin or system action
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    /// Unique identifier for the entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Actor behind the action (null for unattributed system work)
    pub actor_id: Option<Uuid>,

    /// Action name (e.g., api_key.create, model.sync)
    pub action: String,

    /// Resource type the action touched
    pub resource_type: String,

    /// Resource identifier the action touched
    pub resource_id: String,

    /// Arbitrary JSON metadata
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,

    /// Whether the action succeeded
    pub success: bool,

    /// Timestamp when the entry was written
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
