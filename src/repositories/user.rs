//! User repository for database operations

use anyhow::{Result, anyhow};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::user::{self, Entity as User};

/// Repository for user database operations
#[derive(Debug, Clone)]
pub struct UserRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Creates a new UserRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<user::Model>> {
        Ok(User::find_by_id(*id).one(&*self.db).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_all(&self) -> Result<Vec<user::Model>> {
        Ok(User::find()
            .order_by_asc(user::Column::CreatedAt)
            .order_by_asc(user::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Creates a new user record
    pub async fn create(&self, account: user::ActiveModel) -> Result<user::Model> {
        let id = account
            .id
            .clone()
            .take()
            .ok_or_else(|| anyhow!("user id must be set"))?;

        account.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = User::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("user not persisted"))
    }
}
