use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::errors::AppError;
use crate::models::document::{Document, DocumentStatus};

/// Bytes of entropy behind every public token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Length of a rendered token: two hex characters per byte.
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Generate a new public signing token: 32 bytes from the OS random source,
/// rendered as 64 lowercase hex characters.
pub fn issue() -> Result<String, AppError> {
    random_hex(TOKEN_BYTES)
}

/// `len` random bytes from the OS source, hex encoded. Fails only if the
/// entropy source does.
pub fn random_hex(len: usize) -> Result<String, AppError> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AppError::Entropy(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// Exact match against the document's outstanding token, regardless of status.
pub fn matches(token: &str, document: &Document) -> bool {
    match document.public_token.as_deref() {
        Some(expected) => constant_time_eq(expected, token),
        None => false,
    }
}

/// A token admits its holder only while the document is still pending.
/// There is no clock-based expiry: signing or rejecting closes the window.
pub fn validate(token: &str, document: &Document) -> bool {
    matches(token, document) && document.status == DocumentStatus::Pending
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc_with(token: Option<&str>, status: DocumentStatus) -> Document {
        Document {
            id: 1,
            owner_id: 1,
            binary_ref: "doc.pdf".to_string(),
            original_name: "doc.pdf".to_string(),
            status,
            public_token: token.map(String::from),
            signer_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_is_fixed_length_lowercase_hex() {
        let token = issue().unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_issue_is_not_repeated() {
        let a = issue().unwrap();
        let b = issue().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_requires_exact_match_and_pending() {
        let token = issue().unwrap();
        let pending = doc_with(Some(&token), DocumentStatus::Pending);
        assert!(validate(&token, &pending));
        assert!(!validate(&token[..TOKEN_LEN - 1], &pending));
        assert!(!validate(&token.to_uppercase(), &pending));

        let signed = doc_with(Some(&token), DocumentStatus::Signed);
        assert!(matches(&token, &signed));
        assert!(!validate(&token, &signed));

        let rejected = doc_with(Some(&token), DocumentStatus::Rejected);
        assert!(!validate(&token, &rejected));
    }

    #[test]
    fn test_no_outstanding_request_admits_nobody() {
        let doc = doc_with(None, DocumentStatus::Pending);
        assert!(!validate("", &doc));
        assert!(!validate(&issue().unwrap(), &doc));
    }
}
