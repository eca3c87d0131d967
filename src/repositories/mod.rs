//! Repository layer wrapping SeaORM entity operations
//!
//! Repositories own the query shapes; multi-step invariants (cascades,
//! history mirroring) live in the service layer, which runs them inside
//! transactions.

pub mod api_key;
pub mod audit_log;
pub mod model;
pub mod subscription;
pub mod user;

pub use api_key::ApiKeyRepository;
pub use audit_log::AuditLogRepository;
pub use model::ModelRepository;
pub use subscription::SubscriptionRepository;
pub use user::UserRepository;
