use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::types::*;
use crate::audit::{AuditError, AuditSink};

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    document_id: i64,
    actor_id: Option<i64>,
    action: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEvent {
    fn from(row: AuditRow) -> Self {
        AuditEvent {
            id: row.id,
            document_id: row.document_id,
            actor_id: row.actor_id,
            action: row.action,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

/// Append-only audit table in Postgres. The table trigger rejects
/// UPDATE and DELETE, so rows written here are final.
#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        PgAuditLog { pool }
    }
}

impl AuditSink for PgAuditLog {
    async fn append(&self, event: NewAuditEvent) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO audit_events (document_id, actor_id, action, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.document_id)
        .bind(event.actor_id)
        .bind(event.action.as_str())
        .bind(event.origin.ip_address)
        .bind(event.origin.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_document(&self, document_id: i64) -> Result<Vec<AuditEvent>, AuditError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, document_id, actor_id, action, ip_address, user_agent, created_at \
             FROM audit_events WHERE document_id = $1 \
             ORDER BY created_at, id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AuditEvent::from).collect())
    }
}
