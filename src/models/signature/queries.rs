use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::PlacementRepository;
use super::types::*;
use crate::errors::AppError;
use crate::models::document::DocumentStatus;

#[derive(sqlx::FromRow)]
struct PlacementRow {
    id: i64,
    document_id: i64,
    signer_id: Option<i64>,
    page: i32,
    x: f64,
    y: f64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PlacementRow> for SignaturePlacement {
    type Error = AppError;

    fn try_from(row: PlacementRow) -> Result<Self, Self::Error> {
        let status = DocumentStatus::parse(&row.status).ok_or_else(|| {
            AppError::Db(sqlx::Error::Decode(
                format!("unknown placement status {:?}", row.status).into(),
            ))
        })?;
        Ok(SignaturePlacement {
            id: row.id,
            document_id: row.document_id,
            signer_id: row.signer_id,
            page: row.page.max(0) as u32,
            x: row.x,
            y: row.y,
            status,
            created_at: row.created_at,
        })
    }
}

/// Signature placements table in Postgres.
#[derive(Debug, Clone)]
pub struct PgPlacements {
    pool: PgPool,
}

impl PgPlacements {
    pub fn new(pool: PgPool) -> Self {
        PgPlacements { pool }
    }
}

impl PlacementRepository for PgPlacements {
    async fn insert(&self, new: NewPlacement) -> Result<SignaturePlacement, AppError> {
        let row = sqlx::query_as::<_, PlacementRow>(
            "INSERT INTO signature_placements (document_id, signer_id, page, x, y) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, document_id, signer_id, page, x, y, status, created_at",
        )
        .bind(new.document_id)
        .bind(new.signer_id)
        .bind(new.page as i32)
        .bind(new.x)
        .bind(new.y)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_for_document(&self, document_id: i64) -> Result<Vec<SignaturePlacement>, AppError> {
        let rows = sqlx::query_as::<_, PlacementRow>(
            "SELECT id, document_id, signer_id, page, x, y, status, created_at \
             FROM signature_placements WHERE document_id = $1 ORDER BY id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SignaturePlacement::try_from).collect()
    }

    async fn settle_pending(&self, document_id: i64, status: DocumentStatus) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE signature_placements SET status = $2 \
             WHERE document_id = $1 AND status = 'pending'",
        )
        .bind(document_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
