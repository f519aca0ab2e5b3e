use std::fmt;

use crate::audit::AuditError;
use crate::storage::StorageError;

/// Stable error kinds exposed to callers. The HTTP layer maps these to
/// status codes; messages may change, kinds may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    Format,
    BadInput,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Format => "format_error",
            ErrorKind::BadInput => "bad_input",
            ErrorKind::Storage => "storage_error",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    /// The document row exists but its stored bytes do not.
    BytesMissing(String),
    Conflict(String),
    Unauthorized(String),
    Format(String),
    BadInput(String),
    Storage(StorageError),
    Db(sqlx::Error),
    /// Reading the audit trail failed. Appends never surface here.
    Audit(AuditError),
    Entropy(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) | AppError::BytesMissing(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Format(_) => ErrorKind::Format,
            AppError::BadInput(_) => ErrorKind::BadInput,
            AppError::Storage(_) | AppError::Db(_) | AppError::Audit(_) => ErrorKind::Storage,
            AppError::Entropy(_) => ErrorKind::Internal,
        }
    }

    /// The message every bearer-token failure collapses to, so a caller
    /// cannot tell a wrong token from a missing document.
    pub fn document_not_found() -> Self {
        AppError::NotFound("document not found".to_string())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {msg}"),
            AppError::BytesMissing(msg) => write!(f, "Stored document missing: {msg}"),
            AppError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::Format(msg) => write!(f, "Format error: {msg}"),
            AppError::BadInput(msg) => write!(f, "Bad input: {msg}"),
            AppError::Storage(e) => write!(f, "Storage error: {e}"),
            AppError::Db(e) => write!(f, "Database error: {e}"),
            AppError::Audit(e) => write!(f, "Audit trail error: {e}"),
            AppError::Entropy(msg) => write!(f, "Entropy source failure: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Db(e)
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Storage(e)
    }
}

impl From<AuditError> for AppError {
    fn from(e: AuditError) -> Self {
        AppError::Audit(e)
    }
}
