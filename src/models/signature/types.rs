use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::document::DocumentStatus;

/// Where a signer asked for their mark, in viewer coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignaturePlacement {
    pub id: i64,
    pub document_id: i64,
    /// `None` when placed by an unauthenticated token holder.
    pub signer_id: Option<i64>,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlacement {
    pub document_id: i64,
    pub signer_id: Option<i64>,
    pub page: u32,
    pub x: f64,
    pub y: f64,
}
