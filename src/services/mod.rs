//! Service layer: the consistency and cascade engine
//!
//! Services own every multi-step invariant: the unavailability cascade, the
//! proxy-first model-removal ordering, key admission control, and restriction
//! demotion. Handlers stay thin and delegate here.

pub mod api_keys;
pub mod audit;
pub mod model_sync;
pub mod subscriptions;

pub use api_keys::ApiKeyService;
pub use audit::AuditService;
pub use model_sync::ModelSyncService;
pub use subscriptions::SubscriptionService;
