use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to a document. The set is open: anything not named here
/// travels as `Other` and is stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditAction {
    DocumentUploaded,
    SignatureRequestSent,
    SignaturePositionCreated,
    DocumentSignedAndFinalized,
    DocumentRejected,
    Other(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            AuditAction::DocumentUploaded => "DOCUMENT_UPLOADED",
            AuditAction::SignatureRequestSent => "SIGNATURE_REQUEST_SENT",
            AuditAction::SignaturePositionCreated => "SIGNATURE_POSITION_CREATED",
            AuditAction::DocumentSignedAndFinalized => "DOCUMENT_SIGNED_AND_FINALIZED",
            AuditAction::DocumentRejected => "DOCUMENT_REJECTED",
            AuditAction::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "DOCUMENT_UPLOADED" => AuditAction::DocumentUploaded,
            "SIGNATURE_REQUEST_SENT" => AuditAction::SignatureRequestSent,
            "SIGNATURE_POSITION_CREATED" => AuditAction::SignaturePositionCreated,
            "DOCUMENT_SIGNED_AND_FINALIZED" => AuditAction::DocumentSignedAndFinalized,
            "DOCUMENT_REJECTED" => AuditAction::DocumentRejected,
            other => AuditAction::Other(other.to_string()),
        }
    }
}

/// Caller network metadata, the only traceability for token holders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestOrigin {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        RequestOrigin {
            ip_address: Some(ip_address.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub document_id: i64,
    /// `None` for token holders and system actions.
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub origin: RequestOrigin,
}

/// A stored audit record. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub id: i64,
    pub document_id: i64,
    pub actor_id: Option<i64>,
    pub action: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
