mod memory;
mod queries;
mod types;

use std::future::Future;

use crate::errors::AppError;
use crate::models::document::DocumentStatus;

pub use memory::InMemoryPlacements;
pub use queries::PgPlacements;
pub use types::*;

pub trait PlacementRepository: Send + Sync {
    fn insert(
        &self,
        new: NewPlacement,
    ) -> impl Future<Output = Result<SignaturePlacement, AppError>> + Send;

    /// In creation order.
    fn list_for_document(
        &self,
        document_id: i64,
    ) -> impl Future<Output = Result<Vec<SignaturePlacement>, AppError>> + Send;

    /// Move every still-pending placement of a document to `status`.
    /// Returns how many rows changed.
    fn settle_pending(
        &self,
        document_id: i64,
        status: DocumentStatus,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
