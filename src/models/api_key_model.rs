//! API key / model join entity
//!
//! Pure many-to-many join between api_keys and models. A key whose last join
//! row is removed is an orphaned key and must be deactivated.

use super::api_key::Entity as ApiKey;
use super::model::Entity as LlmModel;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Association between one API key and one model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_key_models")]
pub struct Model {
    /// Key side of the association (composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub api_key_id: Uuid,

    /// Model side of the association (composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub model_id: String,

    /// Timestamp when the association was created
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "ApiKey",
        from = "Column::ApiKeyId",
        to = "super::api_key::Column::Id"
    )]
    ApiKey,
    #[sea_orm(
        belongs_to = "LlmModel",
        from = "Column::ModelId",
        to = "super::model::Column::Id"
    )]
    LlmModel,
}

impl Related<ApiKey> for Entity {
    fn to() -> RelationDef {
        Relation::ApiKey.def()
    }
}

impl Related<LlmModel> for Entity {
    fn to() -> RelationDef {
        Relation::LlmModel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
