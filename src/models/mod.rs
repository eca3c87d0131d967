//! # Data Models
//!
//! This module contains all the SeaORM entity models used throughout the
//! LLM admin control plane.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod api_key;
pub mod api_key_model;
pub mod audit_log;
pub mod model;
pub mod subscription;
pub mod subscription_status_history;
pub mod user;

pub use api_key::Entity as ApiKey;
pub use api_key_model::Entity as ApiKeyModel;
pub use audit_log::Entity as AuditLog;
pub use model::Entity as LlmModel;
pub use subscription::Entity as Subscription;
pub use subscription_status_history::Entity as SubscriptionStatusHistory;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "llm-admin".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
