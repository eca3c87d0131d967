//! Migration to create the api_key_models join table.
//!
//! Pure many-to-many join between api_keys and models, with cascade delete on
//! either side.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiKeyModels::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ApiKeyModels::ApiKeyId).uuid().not_null())
                    .col(ColumnDef::new(ApiKeyModels::ModelId).text().not_null())
                    .col(
                        ColumnDef::new(ApiKeyModels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(ApiKeyModels::ApiKeyId)
                            .col(ApiKeyModels::ModelId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_key_models_api_key_id")
                            .from(ApiKeyModels::Table, ApiKeyModels::ApiKeyId)
                            .to(ApiKeys::Table, ApiKeys::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_key_models_model_id")
                            .from(ApiKeyModels::Table, ApiKeyModels::ModelId)
                            .to(Models::Table, Models::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_api_key_models_model_id")
                    .table(ApiKeyModels::Table)
                    .col(ApiKeyModels::ModelId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_api_key_models_model_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ApiKeyModels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApiKeyModels {
    Table,
    ApiKeyId,
    ModelId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ApiKeys {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Models {
    Table,
    Id,
}
