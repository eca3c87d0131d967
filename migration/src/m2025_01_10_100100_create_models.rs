//! Migration to create the models table.
//!
//! The models table is the local catalog of LLM endpoints served by the
//! external proxy. The `id` column doubles as the proxy-side model name;
//! `external_model_id` tracks the proxy's internal identifier so the sync
//! engine can detect silent delete-and-recreate drift.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Models::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Models::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(Models::Provider).text().not_null())
                    .col(
                        ColumnDef::new(Models::InputCostPerToken)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Models::OutputCostPerToken)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(Models::ContextLength).integer().null())
                    .col(
                        ColumnDef::new(Models::SupportsVision)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Models::SupportsFunctionCalling)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Models::SupportsParallelFunctionCalling)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Models::SupportsToolChoice)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Models::Availability)
                            .text()
                            .not_null()
                            .default("available"),
                    )
                    .col(
                        ColumnDef::new(Models::RestrictedAccess)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Models::ExternalModelId).text().null())
                    .col(ColumnDef::new(Models::Description).text().null())
                    .col(
                        ColumnDef::new(Models::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Models::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Models::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_models_availability")
                    .table(Models::Table)
                    .col(Models::Availability)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_models_availability").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Models::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Models {
    Table,
    Id,
    Provider,
    InputCostPerToken,
    OutputCostPerToken,
    ContextLength,
    SupportsVision,
    SupportsFunctionCalling,
    SupportsParallelFunctionCalling,
    SupportsToolChoice,
    Availability,
    RestrictedAccess,
    ExternalModelId,
    Description,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}
