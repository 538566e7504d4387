use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo_types::Role;
use crate::clock::Clock;

/// One append-only audit record. Action tags are free-form (`LOGIN`,
/// `FAILED_LOGIN`, `UPDATE_EMERGENCY_CONTACT`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: String,
    pub actor_role: Role,
    pub action: String,
    pub detail: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Where managers send their audit records.
pub trait AuditSink: Send + Sync {
    fn append(&self, actor_id: &str, actor_role: Role, action: &str, detail: &str)
        -> AuditLogEntry;
}

/// In-memory audit trail. Entries are never mutated or removed.
pub struct AuditLog {
    entries: RwLock<Vec<AuditLogEntry>>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Snapshot in insertion order.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().clone()
    }

    pub fn entries_for_actor(&self, actor_id: &str) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.actor_id == actor_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AuditSink for AuditLog {
    fn append(
        &self,
        actor_id: &str,
        actor_role: Role,
        action: &str,
        detail: &str,
    ) -> AuditLogEntry {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            actor_id: actor_id.to_string(),
            actor_role,
            action: action.to_string(),
            detail: detail.to_string(),
            timestamp: self.clock.now(),
        };
        self.entries.write().push(entry.clone());
        debug!(actor_id, role = ?actor_role, action, "audit entry appended");
        entry
    }
}
