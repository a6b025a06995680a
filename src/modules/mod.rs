pub mod certificates;
pub mod sessions;
pub mod standards;

use axum::Json;
use serde::Serialize;

use crate::engine::{AuditRecord, Audited};

/// Mutation response: the new state plus the audit detail for the caller.
#[derive(Debug, Serialize)]
pub struct AuditedResponse<T> {
    pub data: T,
    pub audit: AuditRecord,
}

/// Writes the audit record to the `audit` log target and wraps the value.
pub fn forward_audit<T: Serialize>(audited: Audited<T>) -> Json<AuditedResponse<T>> {
    let Audited { value, audit } = audited;
    tracing::info!(
        target: "audit",
        operation = ?audit.operation,
        actor = %audit.actor.user_id,
        role = %audit.actor.role,
        record = %serde_json::to_string(&audit).unwrap_or_default(),
        "Audit record"
    );
    Json(AuditedResponse { data: value, audit })
}
