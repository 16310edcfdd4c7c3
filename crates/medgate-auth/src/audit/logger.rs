//! Best-effort audit writer.

use std::sync::Arc;

use crate::storage::AuditStore;

use super::{AuditEntry, AuditOutcome};

/// Appends audit records without ever failing the caller.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
}

impl AuditLogger {
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Appends one record. There is no switch to skip it.
    ///
    /// A store failure is logged and returned as [`AuditOutcome::Failed`];
    /// it is never propagated.
    pub async fn record(&self, entry: &AuditEntry) -> AuditOutcome {
        match self.store.append(entry).await {
            Ok(record) => {
                tracing::debug!(
                    audit_id = record.id,
                    user_id = entry.user_id,
                    table = %entry.table_name,
                    action = %entry.action,
                    "Audit record written"
                );
                AuditOutcome::Committed { id: record.id }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_id = entry.user_id,
                    table = %entry.table_name,
                    action = %entry.action,
                    "Failed to write audit record"
                );
                AuditOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
