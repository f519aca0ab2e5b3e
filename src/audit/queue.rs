use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AuditError, AuditSink};
use crate::models::audit::{AuditEvent, NewAuditEvent};

/// Fire-and-forget wrapper around another sink.
///
/// `append` only enqueues; one background task drains the queue into the
/// inner sink in arrival order, so per-document creation order holds.
/// Inner failures are logged by the worker. Must be created inside a Tokio
/// runtime.
pub struct QueuedAuditSink<A> {
    inner: Arc<A>,
    tx: Mutex<Option<mpsc::UnboundedSender<NewAuditEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<A: AuditSink + 'static> QueuedAuditSink<A> {
    pub fn new(inner: A) -> Self {
        let inner = Arc::new(inner);
        let (tx, mut rx) = mpsc::unbounded_channel::<NewAuditEvent>();
        let worker_sink = Arc::clone(&inner);

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let action = event.action.as_str().to_string();
                let document_id = event.document_id;
                if let Err(e) = worker_sink.append(event).await {
                    log::warn!("Queued audit write failed for {action} on document {document_id}: {e}");
                }
            }
            log::debug!("Audit queue drained");
        });

        QueuedAuditSink {
            inner,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Stop accepting events and wait until everything queued has been written.
    pub async fn shutdown(&self) {
        lock(&self.tx).take();
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                log::error!("Audit queue worker ended abnormally: {e}");
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<A: AuditSink + 'static> AuditSink for QueuedAuditSink<A> {
    async fn append(&self, event: NewAuditEvent) -> Result<(), AuditError> {
        match lock(&self.tx).as_ref() {
            Some(tx) => tx.send(event).map_err(|_| AuditError::Closed),
            None => Err(AuditError::Closed),
        }
    }

    /// Reads straight from the inner sink; events still queued are not visible.
    async fn list_for_document(&self, document_id: i64) -> Result<Vec<AuditEvent>, AuditError> {
        self.inner.list_for_document(document_id).await
    }
}
