//! Model catalog entity
//!
//! This module contains the SeaORM entity model for the models table, the
//! local catalog of LLM endpoints served by the external proxy. The `id`
//! column is also the proxy-side model name; `external_model_id` carries the
//! proxy's internal identifier so sync can detect a model that was deleted
//! and recreated under the same name.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Availability value for a model that the proxy currently serves.
pub const AVAILABILITY_AVAILABLE: &str = "available";
/// Availability value for a model absent from the proxy's live list.
pub const AVAILABILITY_UNAVAILABLE: &str = "unavailable";

/// Catalog entry for one served LLM endpoint
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "models")]
pub struct Model {
    /// Catalog identifier; also the external proxy's model name (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Upstream provider (e.g., openai, anthropic)
    pub provider: String,

    /// Price per input token
    pub input_cost_per_token: f64,

    /// Price per output token
    pub output_cost_per_token: f64,

    /// Maximum context window, when known
    pub context_length: Option<i32>,

    /// Whether the model accepts image input
    pub supports_vision: bool,

    /// Whether the model supports function calling
    pub supports_function_calling: bool,

    /// Whether the model supports parallel function calling
    pub supports_parallel_function_calling: bool,

    /// Whether the model supports tool choice
    pub supports_tool_choice: bool,

    /// available | unavailable
    pub availability: String,

    /// Whether subscriptions to this model require explicit admin approval
    pub restricted_access: bool,

    /// The proxy's internal model identifier; changes on silent recreation
    pub external_model_id: Option<String>,

    /// Admin-entered description; never overwritten by sync once set
    pub description: Option<String>,

    /// Timestamp of the last successful sync touching this row
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the model was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the model was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscriptions,
    #[sea_orm(has_many = "super::api_key_model::Entity")]
    ApiKeyModels,
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl Related<super::api_key_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiKeyModels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
