//! Migration to create the api_keys table.
//!
//! `key_hash` is the sha256 of the secret issued by the external proxy, not a
//! locally generated value; authentication must hash what the proxy actually
//! validates. `subscription_id` survives only for legacy single-subscription
//! keys that predate the api_key_models join table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiKeys::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ApiKeys::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(ApiKeys::UserId).uuid().not_null())
                    .col(ColumnDef::new(ApiKeys::Name).text().not_null())
                    .col(ColumnDef::new(ApiKeys::KeyHash).text().not_null())
                    .col(ColumnDef::new(ApiKeys::KeyPrefix).text().not_null())
                    .col(ColumnDef::new(ApiKeys::ExternalKeyValue).text().not_null())
                    .col(ColumnDef::new(ApiKeys::ExternalKeyAlias).text().not_null())
                    .col(ColumnDef::new(ApiKeys::SubscriptionId).uuid().null())
                    .col(ColumnDef::new(ApiKeys::MaxBudget).double().null())
                    .col(ColumnDef::new(ApiKeys::SoftBudget).double().null())
                    .col(ColumnDef::new(ApiKeys::BudgetDuration).text().null())
                    .col(ColumnDef::new(ApiKeys::TpmLimit).big_integer().null())
                    .col(ColumnDef::new(ApiKeys::RpmLimit).big_integer().null())
                    .col(
                        ColumnDef::new(ApiKeys::MaxParallelRequests)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::PerModelLimits)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::LastUsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::SyncStatus)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(ApiKeys::SyncError).text().null())
                    .col(
                        ColumnDef::new(ApiKeys::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ApiKeys::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_keys_user_id")
                            .from(ApiKeys::Table, ApiKeys::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Hash uniqueness is the concurrency backstop for key creation.
        manager
            .create_index(
                Index::create()
                    .name("idx_api_keys_key_hash")
                    .table(ApiKeys::Table)
                    .col(ApiKeys::KeyHash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_api_keys_user_active")
                    .table(ApiKeys::Table)
                    .col(ApiKeys::UserId)
                    .col(ApiKeys::IsActive)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_api_keys_key_hash").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_api_keys_user_active").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ApiKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApiKeys {
    Table,
    Id,
    UserId,
    Name,
    KeyHash,
    KeyPrefix,
    ExternalKeyValue,
    ExternalKeyAlias,
    SubscriptionId,
    MaxBudget,
    SoftBudget,
    BudgetDuration,
    TpmLimit,
    RpmLimit,
    MaxParallelRequests,
    PerModelLimits,
    IsActive,
    ExpiresAt,
    RevokedAt,
    LastUsedAt,
    SyncStatus,
    SyncError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
