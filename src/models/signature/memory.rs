use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::PlacementRepository;
use super::types::*;
use crate::errors::AppError;
use crate::models::document::DocumentStatus;

#[derive(Debug, Default, Clone)]
pub struct InMemoryPlacements {
    rows: Arc<Mutex<Vec<SignaturePlacement>>>,
}

impl InMemoryPlacements {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<SignaturePlacement>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PlacementRepository for InMemoryPlacements {
    async fn insert(&self, new: NewPlacement) -> Result<SignaturePlacement, AppError> {
        let mut rows = self.rows();
        let placement = SignaturePlacement {
            id: rows.len() as i64 + 1,
            document_id: new.document_id,
            signer_id: new.signer_id,
            page: new.page,
            x: new.x,
            y: new.y,
            status: DocumentStatus::Pending,
            created_at: Utc::now(),
        };
        rows.push(placement.clone());
        Ok(placement)
    }

    async fn list_for_document(&self, document_id: i64) -> Result<Vec<SignaturePlacement>, AppError> {
        Ok(self
            .rows()
            .iter()
            .filter(|p| p.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn settle_pending(&self, document_id: i64, status: DocumentStatus) -> Result<u64, AppError> {
        let mut count = 0;
        for placement in self.rows().iter_mut() {
            if placement.document_id == document_id && placement.status == DocumentStatus::Pending {
                placement.status = status;
                count += 1;
            }
        }
        Ok(count)
    }
}
