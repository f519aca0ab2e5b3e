use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow state shared by documents and their signature placements.
///
/// `Pending` is the only non-terminal state; it may move to `Signed` or
/// `Rejected` and nothing leaves either of those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Signed,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Signed => "signed",
            DocumentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "signed" => Some(DocumentStatus::Signed),
            "rejected" => Some(DocumentStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DocumentStatus::Pending)
    }

    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Pending, DocumentStatus::Signed)
                | (DocumentStatus::Pending, DocumentStatus::Rejected)
        )
    }
}

/// An uploaded document. The bytes live in blob storage under `binary_ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub owner_id: i64,
    pub binary_ref: String,
    pub original_name: String,
    pub status: DocumentStatus,
    /// Present only while a signature request is outstanding.
    pub public_token: Option<String>,
    pub signer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: i64,
    pub binary_ref: String,
    pub original_name: String,
}

/// What an unauthenticated token holder may see about a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicDocumentView {
    pub id: i64,
    pub original_name: String,
    pub status: DocumentStatus,
}

impl From<&Document> for PublicDocumentView {
    fn from(doc: &Document) -> Self {
        PublicDocumentView {
            id: doc.id,
            original_name: doc.original_name.clone(),
            status: doc.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_transitions_allowed() {
        use DocumentStatus::*;
        assert!(Pending.can_transition_to(Signed));
        assert!(Pending.can_transition_to(Rejected));
        for from in [Signed, Rejected] {
            for to in [Pending, Signed, Rejected] {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_status_round_trips_through_storage_tag() {
        for status in [DocumentStatus::Pending, DocumentStatus::Signed, DocumentStatus::Rejected] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("SIGNED"), None);
        assert_eq!(serde_json::to_string(&DocumentStatus::Signed).unwrap(), "\"signed\"");
    }
}
