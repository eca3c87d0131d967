//! API key entity model
//!
//! A credential bound to a user and one or more models via api_key_models.
//! `key_hash` must always equal sha256(`external_key_value`): the secret is
//! issued by the external proxy and the proxy is what runtime authentication
//! ultimately validates. `subscription_id` is kept only for legacy
//! single-subscription keys with no join-table rows.

use super::user::Entity as User;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Sync status values for the proxy mirror of a key.
pub mod sync_status {
    pub const PENDING: &str = "pending";
    pub const SYNCED: &str = "synced";
    pub const ERROR: &str = "error";
}

/// Multi-model API key mirrored to the external proxy
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    /// Unique identifier for the key (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// User-supplied display name (may duplicate across keys)
    pub name: String,

    /// sha256 hex of the proxy-issued secret (unique)
    pub key_hash: String,

    /// Display-only prefix of the secret
    pub key_prefix: String,

    /// The actual secret issued by the proxy
    pub external_key_value: String,

    /// Globally-unique proxy-side alias; matches usage analytics back to us
    pub external_key_alias: String,

    /// Legacy single-subscription binding (pre join-table keys only)
    pub subscription_id: Option<Uuid>,

    /// Hard budget ceiling
    pub max_budget: Option<f64>,

    /// Soft budget threshold for alerts
    pub soft_budget: Option<f64>,

    /// Budget reset window (e.g., "30d")
    pub budget_duration: Option<String>,

    /// Tokens-per-minute limit
    pub tpm_limit: Option<i64>,

    /// Requests-per-minute limit
    pub rpm_limit: Option<i64>,

    /// Parallel request ceiling
    pub max_parallel_requests: Option<i32>,

    /// Per-model budget/rate-limit overrides, keyed by model id
    #[sea_orm(column_type = "JsonBinary")]
    pub per_model_limits: Option<JsonValue>,

    /// False once revoked or orphaned
    pub is_active: bool,

    /// Optional expiry
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Set on soft revocation
    pub revoked_at: Option<DateTimeWithTimeZone>,

    /// Best-effort last validation timestamp
    pub last_used_at: Option<DateTimeWithTimeZone>,

    /// pending | synced | error
    pub sync_status: String,

    /// Last proxy sync error, when sync_status = error
    pub sync_error: Option<String>,

    /// Timestamp when the key was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the key was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "User",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::api_key_model::Entity")]
    ApiKeyModels,
}

impl Related<User> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::api_key_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiKeyModels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
