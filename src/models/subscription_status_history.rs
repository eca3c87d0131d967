//! Subscription status history entity model
//!
//! Append-only log of subscription status transitions.

use super::subscription::Entity as Subscription;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// One recorded status transition for a subscription
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "subscription_status_history")]
pub struct Model {
    /// Unique identifier for the history entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Subscription this entry belongs to
    pub subscription_id: Uuid,

    /// Status before the transition (null for the initial entry)
    pub old_status: Option<String>,

    /// Status after the transition
    pub new_status: String,

    /// Reason recorded with the transition
    pub reason: Option<String>,

    /// Actor behind the transition
    pub changed_by: Option<Uuid>,

    /// When the transition happened
    pub changed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Subscription",
        from = "Column::SubscriptionId",
        to = "super::subscription::Column::Id"
    )]
    Subscription,
}

impl Related<Subscription> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
