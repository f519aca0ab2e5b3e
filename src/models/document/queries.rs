use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::DocumentRepository;
use super::types::*;
use crate::errors::AppError;

const SELECT_DOCUMENT: &str = "\
    SELECT id, owner_id, binary_ref, original_name, status, \
           public_token, signer_email, created_at, updated_at \
    FROM documents";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: i64,
    owner_id: i64,
    binary_ref: String,
    original_name: String,
    status: String,
    public_token: Option<String>,
    signer_email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = AppError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let status = DocumentStatus::parse(&row.status).ok_or_else(|| {
            AppError::Db(sqlx::Error::Decode(
                format!("unknown document status {:?}", row.status).into(),
            ))
        })?;
        Ok(Document {
            id: row.id,
            owner_id: row.owner_id,
            binary_ref: row.binary_ref,
            original_name: row.original_name,
            status,
            public_token: row.public_token,
            signer_email: row.signer_email,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Documents table in Postgres.
#[derive(Debug, Clone)]
pub struct PgDocuments {
    pool: PgPool,
}

impl PgDocuments {
    pub fn new(pool: PgPool) -> Self {
        PgDocuments { pool }
    }
}

impl DocumentRepository for PgDocuments {
    async fn insert(&self, new: NewDocument) -> Result<Document, AppError> {
        let sql = "INSERT INTO documents (owner_id, binary_ref, original_name) \
                   VALUES ($1, $2, $3) \
                   RETURNING id, owner_id, binary_ref, original_name, status, \
                             public_token, signer_email, created_at, updated_at";
        let row = sqlx::query_as::<_, DocumentRow>(sql)
            .bind(new.owner_id)
            .bind(&new.binary_ref)
            .bind(&new.original_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    AppError::Conflict(format!("binary ref {} already in use", new.binary_ref))
                }
                other => AppError::Db(other),
            })?;
        row.try_into()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Document>, AppError> {
        let sql = format!("{SELECT_DOCUMENT} WHERE id = $1");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Document::try_from).transpose()
    }

    async fn find_by_public_token(&self, token: &str) -> Result<Option<Document>, AppError> {
        let sql = format!("{SELECT_DOCUMENT} WHERE public_token = $1");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Document::try_from).transpose()
    }

    async fn find_by_owner(&self, owner_id: i64) -> Result<Vec<Document>, AppError> {
        let sql = format!("{SELECT_DOCUMENT} WHERE owner_id = $1 ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Document::try_from).collect()
    }

    async fn attach_signature_request(
        &self,
        id: i64,
        token: &str,
        signer_email: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE documents \
             SET public_token = $2, signer_email = $3, updated_at = now() \
             WHERE id = $1 AND status = 'pending' AND public_token IS NULL",
        )
        .bind(id)
        .bind(token)
        .bind(signer_email)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("public token already in use".to_string())
            }
            other => AppError::Db(other),
        })?;
        Ok(result.rows_affected() == 1)
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
        let result = sqlx::query(
            "UPDATE documents SET status = $3, updated_at = now() \
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_signed(&self, id: i64, binary_ref: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE documents SET status = 'signed', binary_ref = $2, updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(binary_ref)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
