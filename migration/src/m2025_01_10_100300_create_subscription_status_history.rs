//! Migration to create the subscription_status_history table.
//!
//! Append-only log of subscription status transitions, keyed by subscription.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionStatusHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionStatusHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionStatusHistory::SubscriptionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionStatusHistory::OldStatus)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionStatusHistory::NewStatus)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionStatusHistory::Reason)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionStatusHistory::ChangedBy)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionStatusHistory::ChangedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscription_status_history_subscription_id")
                            .from(
                                SubscriptionStatusHistory::Table,
                                SubscriptionStatusHistory::SubscriptionId,
                            )
                            .to(Subscriptions::Table, Subscriptions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscription_status_history_subscription_id")
                    .table(SubscriptionStatusHistory::Table)
                    .col(SubscriptionStatusHistory::SubscriptionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_subscription_status_history_subscription_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(SubscriptionStatusHistory::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum SubscriptionStatusHistory {
    Table,
    Id,
    SubscriptionId,
    OldStatus,
    NewStatus,
    Reason,
    ChangedBy,
    ChangedAt,
}

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
}
