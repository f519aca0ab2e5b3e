mod memory;
mod queries;
mod types;

use std::future::Future;

use crate::errors::AppError;

pub use memory::InMemoryDocuments;
pub use queries::PgDocuments;
pub use types::*;

pub trait DocumentRepository: Send + Sync {
    fn insert(&self, new: NewDocument) -> impl Future<Output = Result<Document, AppError>> + Send;

    fn find_by_id(&self, id: i64) -> impl Future<Output = Result<Option<Document>, AppError>> + Send;

    fn find_by_public_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<Document>, AppError>> + Send;

    /// Newest first.
    fn find_by_owner(&self, owner_id: i64) -> impl Future<Output = Result<Vec<Document>, AppError>> + Send;

    /// Record an outstanding signature request. Returns `false` when the
    /// document is missing, no longer pending, or already has a token.
    /// A token already held by another document is a `Conflict`.
    fn attach_signature_request(
        &self,
        id: i64,
        token: &str,
        signer_email: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Atomically move `id` from `expected` to `next`. Returns `false` if the
    /// current status is not `expected` or the transition is not allowed.
    fn compare_and_set_status(
        &self,
        id: i64,
        expected: DocumentStatus,
        next: DocumentStatus,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Atomically move `id` from pending to signed and point it at the
    /// signed bytes under `binary_ref`. Returns `false` if the document is
    /// missing or no longer pending, in which case nothing changes.
    fn mark_signed(&self, id: i64, binary_ref: &str) -> impl Future<Output = Result<bool, AppError>> + Send;
}
