//! Fire-and-forget audit sink
//!
//! Audit writes never fail their caller: a lost entry is logged and dropped.
//! Nothing in the control plane reads audit rows back on a decision path.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::repositories::AuditLogRepository;

/// Append-only audit recorder
#[derive(Debug, Clone)]
pub struct AuditService {
    repo: AuditLogRepository,
}

impl AuditService {
    pub fn new(repo: AuditLogRepository) -> Self {
        Self { repo }
    }

    /// Records one audit entry, swallowing persistence failures
    pub async fn record(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: Option<JsonValue>,
        success: bool,
    ) {
        if let Err(err) = self
            .repo
            .record(actor_id, action, resource_type, resource_id, metadata, success)
            .await
        {
            tracing::warn!(
                action,
                resource_type,
                resource_id,
                error = %err,
                "Failed to write audit entry"
            );
        }
    }
}
