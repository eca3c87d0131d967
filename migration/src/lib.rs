//! Database migrations for the LLM admin control plane.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_100000_create_users;
mod m2025_01_10_100100_create_models;
mod m2025_01_10_100200_create_subscriptions;
mod m2025_01_10_100300_create_subscription_status_history;
mod m2025_01_10_100400_create_api_keys;
mod m2025_01_10_100500_create_api_key_models;
mod m2025_01_10_100600_create_audit_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_100000_create_users::Migration),
            Box::new(m2025_01_10_100100_create_models::Migration),
            Box::new(m2025_01_10_100200_create_subscriptions::Migration),
            Box::new(m2025_01_10_100300_create_subscription_status_history::Migration),
            Box::new(m2025_01_10_100400_create_api_keys::Migration),
            Box::new(m2025_01_10_100500_create_api_key_models::Migration),
            Box::new(m2025_01_10_100600_create_audit_logs::Migration),
        ]
    }
}
