//! Who may act on a document.
//!
//! Two kinds of caller exist:
//!
//! - an authenticated owner, identified by user id (session handling lives
//!   in the HTTP layer), and
//! - an anonymous bearer of the document's public token.
//!
//! Bearer failures are reported exactly like a missing document so that
//! probing with guessed ids or tokens reveals nothing. Owner failures are a
//! plain `Unauthorized`: the owner is authenticated and already knows the
//! document exists.

use crate::auth::token;
use crate::errors::AppError;
use crate::models::document::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    Owner {
        user_id: i64,
        display_name: Option<String>,
    },
    Bearer(String),
}

impl Requester {
    pub fn owner(user_id: i64) -> Self {
        Requester::Owner {
            user_id,
            display_name: None,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Requester::Bearer(token.into())
    }
}

/// What a successful check establishes about the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// `None` for bearers: no identity is established.
    pub actor_id: Option<i64>,
    pub display_name: Option<String>,
}

/// Owner-only operations.
pub fn authorize_owner(document: &Document, user_id: i64) -> Result<Grant, AppError> {
    if document.owner_id != user_id {
        log::warn!("User {} denied access to document {}", user_id, document.id);
        return Err(AppError::Unauthorized(format!(
            "document {} belongs to another user",
            document.id
        )));
    }
    Ok(Grant {
        actor_id: Some(user_id),
        display_name: None,
    })
}

/// Bearer check. Only the token match is decided here; whether the document
/// is still open for signing is a workflow question the caller answers.
pub fn authorize_bearer(document: &Document, bearer: &str) -> Result<Grant, AppError> {
    if !token::matches(bearer, document) {
        return Err(AppError::document_not_found());
    }
    Ok(Grant {
        actor_id: None,
        display_name: None,
    })
}

pub fn authorize(document: &Document, requester: &Requester) -> Result<Grant, AppError> {
    match requester {
        Requester::Owner {
            user_id,
            display_name,
        } => {
            let mut grant = authorize_owner(document, *user_id)?;
            grant.display_name = display_name.clone();
            Ok(grant)
        }
        Requester::Bearer(bearer) => authorize_bearer(document, bearer),
    }
}
