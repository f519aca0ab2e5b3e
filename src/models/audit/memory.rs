use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;

use super::types::*;
use crate::audit::{AuditError, AuditSink};

/// Clones append to the same log.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLog {
    events: Arc<Mutex<Vec<AuditEvent>>>,
    failing_appends: Arc<AtomicU32>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` appends.
    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<AuditEvent> {
        self.events().clone()
    }

    fn events(&self) -> std::sync::MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditSink for InMemoryAuditLog {
    async fn append(&self, event: NewAuditEvent) -> Result<(), AuditError> {
        let rejected = self
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(AuditError::Rejected(format!(
                "{} for document {}",
                event.action.as_str(),
                event.document_id
            )));
        }

        let mut events = self.events();
        let id = events.len() as i64 + 1;
        events.push(AuditEvent {
            id,
            document_id: event.document_id,
            actor_id: event.actor_id,
            action: event.action.as_str().to_string(),
            ip_address: event.origin.ip_address,
            user_agent: event.origin.user_agent,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_for_document(&self, document_id: i64) -> Result<Vec<AuditEvent>, AuditError> {
        let mut events: Vec<AuditEvent> = self
            .events()
            .iter()
            .filter(|e| e.document_id == document_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }
}
