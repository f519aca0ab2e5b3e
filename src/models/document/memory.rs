use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::DocumentRepository;
use super::types::*;
use crate::errors::AppError;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    rows: BTreeMap<i64, Document>,
}

/// Documents held in process memory. Clones share the same rows.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocuments {
    state: Arc<Mutex<State>>,
    failing_inserts: Arc<AtomicU32>,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` inserts fail as if the database were unreachable.
    pub fn fail_next_inserts(&self, n: u32) {
        self.failing_inserts.store(n, Ordering::SeqCst);
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentRepository for InMemoryDocuments {
    async fn insert(&self, new: NewDocument) -> Result<Document, AppError> {
        let rejected = self
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(AppError::Db(sqlx::Error::PoolTimedOut));
        }
        let mut state = self.state();
        if state.rows.values().any(|d| d.binary_ref == new.binary_ref) {
            return Err(AppError::Conflict(format!(
                "binary ref {} already in use",
                new.binary_ref
            )));
        }
        state.next_id += 1;
        let now = Utc::now();
        let doc = Document {
            id: state.next_id,
            owner_id: new.owner_id,
            binary_ref: new.binary_ref,
            original_name: new.original_name,
            status: DocumentStatus::Pending,
            public_token: None,
            signer_email: None,
            created_at: now,
            updated_at: now,
        };
        state.rows.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Document>, AppError> {
        Ok(self.state().rows.get(&id).cloned())
    }

    async fn find_by_public_token(&self, token: &str) -> Result<Option<Document>, AppError> {
        Ok(self
            .state()
            .rows
            .values()
            .find(|d| d.public_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_by_owner(&self, owner_id: i64) -> Result<Vec<Document>, AppError> {
        let mut docs: Vec<Document> = self
            .state()
            .rows
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(docs)
    }

    async fn attach_signature_request(
        &self,
        id: i64,
        token: &str,
        signer_email: &str,
    ) -> Result<bool, AppError> {
        let mut state = self.state();
        if state
            .rows
            .values()
            .any(|d| d.public_token.as_deref() == Some(token))
        {
            return Err(AppError::Conflict("public token already in use".to_string()));
        }
        match state.rows.get_mut(&id) {
            Some(doc) if doc.status == DocumentStatus::Pending && doc.public_token.is_none() => {
                doc.public_token = Some(token.to_string());
                doc.signer_email = Some(signer_email.to_string());
                doc.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: DocumentStatus,
        next: DocumentStatus,
    ) -> Result<bool, AppError> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }
        let mut state = self.state();
        match state.rows.get_mut(&id) {
            Some(doc) if doc.status == expected => {
                doc.status = next;
                doc.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_signed(&self, id: i64, binary_ref: &str) -> Result<bool, AppError> {
        let mut state = self.state();
        match state.rows.get_mut(&id) {
            Some(doc) if doc.status == DocumentStatus::Pending => {
                doc.status = DocumentStatus::Signed;
                doc.binary_ref = binary_ref.to_string();
                doc.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
