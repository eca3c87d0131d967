//! Subscription entity model
//!
//! A subscription is one user's grant of access to one model. Rows are never
//! hard-deleted; access removal is expressed through status transitions that
//! are mirrored into subscription_status_history.

use super::model::Entity as LlmModel;
use super::user::Entity as User;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Subscription statuses understood by the control plane.
pub mod status {
    pub const ACTIVE: &str = "active";
    pub const SUSPENDED: &str = "suspended";
    pub const CANCELLED: &str = "cancelled";
    pub const EXPIRED: &str = "expired";
    pub const INACTIVE: &str = "inactive";
    pub const PENDING: &str = "pending";
    pub const DENIED: &str = "denied";
}

/// One user's grant of access to one model (unique per user/model pair)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    /// Unique identifier for the subscription (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Granted model (catalog id)
    pub model_id: String,

    /// active | suspended | cancelled | expired | inactive | pending | denied
    pub status: String,

    /// Human-readable reason for the current status
    pub status_reason: Option<String>,

    /// When the status last changed
    pub status_changed_at: Option<DateTimeWithTimeZone>,

    /// Actor behind the last status change (system actor for automation)
    pub status_changed_by: Option<Uuid>,

    /// Requests consumed against this subscription
    pub requests_used: i64,

    /// Request quota, when limited
    pub requests_allotted: Option<i64>,

    /// Tokens consumed against this subscription
    pub tokens_used: i64,

    /// Token quota, when limited
    pub tokens_allotted: Option<i64>,

    /// Budget ceiling, when limited
    pub max_budget: Option<f64>,

    /// Timestamp when the subscription was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the subscription was last updated
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
    #[sea_orm(
        belongs_to = "LlmModel",
        from = "Column::ModelId",
        to = "super::model::Column::Id"
    )]
    LlmModel,
    #[sea_orm(has_many = "super::subscription_status_history::Entity")]
    StatusHistory,
}

impl Related<User> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<LlmModel> for Entity {
    fn to() -> RelationDef {
        Relation::LlmModel.def()
    }
}

impl Related<super::subscription_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
