//! Audit trail recording.
//!
//! Every state-changing operation reports one event through an [`AuditSink`].
//! A failed append never undoes the operation it describes: the
//! [`AuditRecorder`] logs it and hands back a warning for the caller.
//! Deployments that need stronger guarantees swap the sink, not the
//! orchestrator.

mod queue;

use std::future::Future;

use crate::models::audit::{AuditEvent, NewAuditEvent};

pub use queue::QueuedAuditSink;

#[derive(Debug)]
pub enum AuditError {
    Db(sqlx::Error),
    /// The sink no longer accepts events.
    Closed,
    Rejected(String),
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        AuditError::Db(err)
    }
}

impl std::fmt::Display for AuditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditError::Db(e) => write!(f, "Database error: {}", e),
            AuditError::Closed => write!(f, "Audit sink is closed"),
            AuditError::Rejected(msg) => write!(f, "Audit write rejected: {}", msg),
        }
    }
}

impl std::error::Error for AuditError {}

/// Append-only destination for audit events. There is deliberately no
/// update or delete operation.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: NewAuditEvent) -> impl Future<Output = Result<(), AuditError>> + Send;

    /// Events for one document ordered by creation time, ties by insertion order.
    fn list_for_document(
        &self,
        document_id: i64,
    ) -> impl Future<Output = Result<Vec<AuditEvent>, AuditError>> + Send;
}

pub struct AuditRecorder<A> {
    sink: A,
}

impl<A: AuditSink> AuditRecorder<A> {
    pub fn new(sink: A) -> Self {
        AuditRecorder { sink }
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    /// Append one event. Returns a warning message if the sink refused it;
    /// the failure is logged here and is not retried.
    pub async fn record(&self, event: NewAuditEvent) -> Option<String> {
        let action = event.action.as_str().to_string();
        let document_id = event.document_id;
        log::info!("AUDIT {} document={}", action, document_id);

        match self.sink.append(event).await {
            Ok(()) => None,
            Err(e) => {
                let warning = format!("audit write failed for {action} on document {document_id}: {e}");
                log::warn!("{warning}");
                Some(warning)
            }
        }
    }

    pub async fn trail(&self, document_id: i64) -> Result<Vec<AuditEvent>, AuditError> {
        self.sink.list_for_document(document_id).await
    }
}
