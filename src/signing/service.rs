//! The signing workflow: upload, request, place, finalize, reject.
//!
//! Every state-changing operation on a document runs under that document's
//! lock. The lock only covers one process, so the status change itself is a
//! compare-and-swap in the repository. Finalize writes the signed bytes
//! under a fresh key and swaps status and key in that one update; a
//! finalize that loses the swap only ever deletes its own key, so the
//! winner's bytes are never touched.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{AuditRecorder, AuditSink};
use crate::auth::{Requester, access, token};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::audit::{AuditAction, AuditEvent, NewAuditEvent, RequestOrigin};
use crate::models::document::{
    Document, DocumentRepository, DocumentStatus, NewDocument, PublicDocumentView,
};
use crate::models::signature::{NewPlacement, PlacementRepository, SignaturePlacement};
use crate::signing::annotate;
use crate::signing::coords::{self, MarkPlacement, ViewerPoint};
use crate::signing::locks::DocumentLocks;
use crate::signing::mark::SignatureMark;
use crate::storage::{self, BlobStore, RetryPolicy, StorageError, with_retry};

/// Fresh tokens tried before a uniqueness collision is reported.
const TOKEN_ATTEMPTS: u32 = 3;

const MAX_EMAIL_LEN: usize = 254;

/// The only page a placement may target.
pub const SIGNABLE_PAGE: u32 = 0;

#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub document_id: i64,
    pub requester: Requester,
    pub point: ViewerPoint,
    pub mark: SignatureMark,
    pub origin: RequestOrigin,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeOutcome {
    pub document_id: i64,
    pub status: DocumentStatus,
    pub placement: MarkPlacement,
    pub mark_kind: &'static str,
    pub signed_at: DateTime<Utc>,
    /// Present when the document was signed but the audit event was lost.
    pub audit_warning: Option<String>,
}

/// An outstanding request for a signature. Delivering `sign_link` to the
/// signer is the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureRequest {
    pub document_id: i64,
    pub token: String,
    pub sign_link: String,
}

pub struct SigningService<D, P, B, A> {
    config: Config,
    retry: RetryPolicy,
    locks: DocumentLocks,
    documents: D,
    placements: P,
    storage: B,
    audit: AuditRecorder<A>,
}

impl<D, P, B, A> SigningService<D, P, B, A>
where
    D: DocumentRepository,
    P: PlacementRepository,
    B: BlobStore,
    A: AuditSink,
{
    pub fn new(config: Config, documents: D, placements: P, storage: B, audit: A) -> Self {
        SigningService {
            retry: RetryPolicy::from_config(&config),
            config,
            locks: DocumentLocks::new(),
            documents,
            placements,
            storage,
            audit: AuditRecorder::new(audit),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn documents(&self) -> &D {
        &self.documents
    }

    pub fn placements(&self) -> &P {
        &self.placements
    }

    pub fn storage(&self) -> &B {
        &self.storage
    }

    pub fn audit(&self) -> &AuditRecorder<A> {
        &self.audit
    }

    /// Store a new PDF for `owner_id`. The document starts out pending.
    pub async fn upload_document(
        &self,
        owner_id: i64,
        original_name: &str,
        bytes: Vec<u8>,
        origin: RequestOrigin,
    ) -> Result<Document, AppError> {
        let original_name = original_name.trim();
        if original_name.is_empty() {
            return Err(AppError::BadInput("file name is required".to_string()));
        }
        if bytes.is_empty() {
            return Err(AppError::BadInput("no file uploaded".to_string()));
        }
        if bytes.len() > self.config.max_upload_bytes {
            return Err(AppError::BadInput(format!(
                "file exceeds the {} byte upload limit",
                self.config.max_upload_bytes
            )));
        }

        let (bytes, pages) = self
            .run_blocking("inspect upload", move || {
                let pages = annotate::load(&bytes)?.page_count();
                Ok((bytes, pages))
            })
            .await?;

        let binary_ref = storage::new_binary_ref()?;
        self.write_bytes(&binary_ref, &bytes, "store upload").await?;

        let document = match self
            .documents
            .insert(NewDocument {
                owner_id,
                binary_ref: binary_ref.clone(),
                original_name: original_name.to_string(),
            })
            .await
        {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Document row for upload {binary_ref} failed, removing the blob: {e}");
                self.discard(&binary_ref, "remove orphaned upload").await;
                return Err(e);
            }
        };

        self.audit
            .record(NewAuditEvent {
                document_id: document.id,
                actor_id: Some(owner_id),
                action: AuditAction::DocumentUploaded,
                origin,
            })
            .await;

        log::info!(
            "Document {} uploaded by user {} ({} pages, {} bytes)",
            document.id,
            owner_id,
            pages,
            bytes.len()
        );
        Ok(document)
    }

    pub async fn list_documents(&self, owner_id: i64) -> Result<Vec<Document>, AppError> {
        self.documents.find_by_owner(owner_id).await
    }

    /// Open a signature request. Asking again for the same signer while one
    /// is outstanding returns the same token; a different signer is a
    /// `Conflict`.
    pub async fn issue_public_token(
        &self,
        document_id: i64,
        owner_id: i64,
        signer_email: &str,
        origin: RequestOrigin,
    ) -> Result<SignatureRequest, AppError> {
        let signer_email = validate_email(signer_email)?;

        let _guard = self.locks.lock(document_id).await;
        let document = self.load(document_id).await?;
        access::authorize_owner(&document, owner_id)?;
        ensure_pending(&document)?;

        let token = match document.public_token {
            Some(existing) => {
                let same_signer = document
                    .signer_email
                    .as_deref()
                    .is_some_and(|current| current.eq_ignore_ascii_case(signer_email));
                if !same_signer {
                    return Err(AppError::Conflict(format!(
                        "document {document_id} already has a signature request for another signer"
                    )));
                }
                log::info!("Document {document_id} already has an outstanding signature request");
                existing
            }
            None => self.attach_new_token(document_id, signer_email).await?,
        };

        self.audit
            .record(NewAuditEvent {
                document_id,
                actor_id: Some(owner_id),
                action: AuditAction::SignatureRequestSent,
                origin,
            })
            .await;

        log::info!("Signature request opened for document {document_id}");
        Ok(SignatureRequest {
            document_id,
            sign_link: self.config.sign_link(&token),
            token,
        })
    }

    async fn attach_new_token(&self, document_id: i64, signer_email: &str) -> Result<String, AppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let candidate = token::issue()?;
            match self
                .documents
                .attach_signature_request(document_id, &candidate, signer_email)
                .await
            {
                Ok(true) => return Ok(candidate),
                Ok(false) => {
                    return Err(AppError::Conflict(format!(
                        "document {document_id} is no longer open for a signature request"
                    )));
                }
                Err(AppError::Conflict(msg)) if attempt < TOKEN_ATTEMPTS => {
                    log::warn!("Token collision on document {document_id}, retrying: {msg}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Whether `token` currently admits its holder to `document_id`.
    pub async fn validate_public_access(&self, document_id: i64, token: &str) -> Result<bool, AppError> {
        Ok(self
            .documents
            .find_by_id(document_id)
            .await?
            .is_some_and(|document| token::validate(token, &document)))
    }

    /// What a token holder sees before signing.
    pub async fn public_document(&self, token: &str) -> Result<PublicDocumentView, AppError> {
        let document = self
            .documents
            .find_by_public_token(token)
            .await?
            .ok_or_else(AppError::document_not_found)?;
        access::authorize_bearer(&document, token)?;
        Ok(PublicDocumentView::from(&document))
    }

    pub async fn download(&self, document_id: i64, requester: &Requester) -> Result<Vec<u8>, AppError> {
        let document = self.load(document_id).await?;
        access::authorize(&document, requester)?;
        self.read_bytes(&document).await
    }

    pub async fn create_placement(
        &self,
        document_id: i64,
        requester: &Requester,
        point: ViewerPoint,
        page: u32,
        origin: RequestOrigin,
    ) -> Result<SignaturePlacement, AppError> {
        if page != SIGNABLE_PAGE {
            return Err(AppError::BadInput(format!(
                "signatures can only be placed on page {SIGNABLE_PAGE}, got {page}"
            )));
        }

        let _guard = self.locks.lock(document_id).await;
        let document = self.load(document_id).await?;
        let grant = access::authorize(&document, requester)?;
        ensure_pending(&document)?;

        let placement = self
            .placements
            .insert(NewPlacement {
                document_id,
                signer_id: grant.actor_id,
                page,
                x: point.x,
                y: point.y,
            })
            .await?;

        self.audit
            .record(NewAuditEvent {
                document_id,
                actor_id: grant.actor_id,
                action: AuditAction::SignaturePositionCreated,
                origin,
            })
            .await;

        log::info!("Placement {} saved for document {}", placement.id, document_id);
        Ok(placement)
    }

    pub async fn list_placements(
        &self,
        document_id: i64,
        requester: &Requester,
    ) -> Result<Vec<SignaturePlacement>, AppError> {
        let document = self.load(document_id).await?;
        access::authorize(&document, requester)?;
        self.placements.list_for_document(document_id).await
    }

    /// Burn the mark into the first page and move the document to signed.
    ///
    /// Not idempotent: a second call on a signed document is a `Conflict`.
    /// Until the status flips, neither the stored bytes nor the document
    /// row are left changed.
    pub async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizeOutcome, AppError> {
        let FinalizeRequest {
            document_id,
            requester,
            point,
            mark,
            origin,
        } = request;

        let _guard = self.locks.lock(document_id).await;
        let document = self.load(document_id).await?;
        let grant = access::authorize(&document, &requester)?;
        ensure_pending(&document)?;

        let original = match self.read_bytes(&document).await {
            Ok(bytes) => bytes,
            // Another process may have signed it and removed the old bytes.
            Err(AppError::BytesMissing(msg)) => {
                ensure_pending(&self.load(document_id).await?)?;
                return Err(AppError::BytesMissing(msg));
            }
            Err(e) => return Err(e),
        };

        let mark_kind = mark.kind();
        let signed_at = Utc::now();
        let (annotated, placement) = self
            .run_blocking("annotate document", move || {
                let loaded = annotate::load(&original)?;
                let placement = coords::map_to_page(point, loaded.first_page_size()?);
                let annotated = loaded.apply(&placement, &mark, signed_at)?;
                Ok((annotated, placement))
            })
            .await?;

        let signed_ref = storage::new_binary_ref()?;
        if let Err(e) = self
            .write_bytes(&signed_ref, &annotated, "write signed document")
            .await
        {
            // A timed-out attempt may still land late.
            self.discard(&signed_ref, "remove unsigned attempt").await;
            return Err(e);
        }

        match self.documents.mark_signed(document_id, &signed_ref).await {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&signed_ref, "remove losing signature").await;
                return Err(AppError::Conflict(format!(
                    "document {document_id} changed state while it was being signed"
                )));
            }
            Err(e) => {
                // The update may have committed before the error surfaced.
                match self.documents.find_by_id(document_id).await {
                    Ok(Some(current)) if current.binary_ref == signed_ref => {
                        log::warn!("Document {document_id} was signed despite an update error: {e}");
                    }
                    Ok(_) => {
                        self.discard(&signed_ref, "remove unsigned attempt").await;
                        return Err(e);
                    }
                    Err(recheck) => {
                        log::error!(
                            "Cannot tell whether document {document_id} was signed, keeping {signed_ref}: {recheck}"
                        );
                        return Err(e);
                    }
                }
            }
        }

        self.discard(&document.binary_ref, "remove pre-signing bytes").await;

        match self
            .placements
            .settle_pending(document_id, DocumentStatus::Signed)
            .await
        {
            Ok(settled) => log::debug!("Settled {settled} placements on document {document_id}"),
            Err(e) => log::warn!("Could not settle placements for document {document_id}: {e}"),
        }

        let audit_warning = self
            .audit
            .record(NewAuditEvent {
                document_id,
                actor_id: grant.actor_id,
                action: AuditAction::DocumentSignedAndFinalized,
                origin,
            })
            .await;

        log::info!("Document {document_id} signed and finalized with a {mark_kind} mark");
        Ok(FinalizeOutcome {
            document_id,
            status: DocumentStatus::Signed,
            placement,
            mark_kind,
            signed_at,
            audit_warning,
        })
    }

    /// Decline to sign. The document bytes are left as they are.
    pub async fn reject(
        &self,
        document_id: i64,
        requester: &Requester,
        origin: RequestOrigin,
    ) -> Result<Document, AppError> {
        let _guard = self.locks.lock(document_id).await;
        let document = self.load(document_id).await?;
        let grant = access::authorize(&document, requester)?;
        ensure_pending(&document)?;

        let swapped = self
            .documents
            .compare_and_set_status(document_id, DocumentStatus::Pending, DocumentStatus::Rejected)
            .await?;
        if !swapped {
            return Err(AppError::Conflict(format!(
                "document {document_id} changed state while it was being rejected"
            )));
        }

        if let Err(e) = self
            .placements
            .settle_pending(document_id, DocumentStatus::Rejected)
            .await
        {
            log::warn!("Could not settle placements for document {document_id}: {e}");
        }

        self.audit
            .record(NewAuditEvent {
                document_id,
                actor_id: grant.actor_id,
                action: AuditAction::DocumentRejected,
                origin,
            })
            .await;

        log::info!("Document {document_id} rejected");
        self.load(document_id).await
    }

    /// The owner's timeline for one document, newest first.
    pub async fn audit_trail(&self, document_id: i64, owner_id: i64) -> Result<Vec<AuditEvent>, AppError> {
        let document = self.load(document_id).await?;
        access::authorize_owner(&document, owner_id)?;
        let mut events = self.audit.trail(document_id).await?;
        events.reverse();
        Ok(events)
    }

    async fn load(&self, document_id: i64) -> Result<Document, AppError> {
        self.documents
            .find_by_id(document_id)
            .await?
            .ok_or_else(AppError::document_not_found)
    }

    async fn read_bytes(&self, document: &Document) -> Result<Vec<u8>, AppError> {
        let key = document.binary_ref.as_str();
        match with_retry(&self.retry, "read document", || self.storage.read(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(StorageError::NotFound(_)) => {
                log::error!("Document {} has no stored bytes under {}", document.id, key);
                Err(AppError::BytesMissing(format!(
                    "stored file for document {} is missing",
                    document.id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_bytes(&self, key: &str, bytes: &[u8], what: &str) -> Result<(), AppError> {
        with_retry(&self.retry, what, || self.storage.write(key, bytes)).await?;
        Ok(())
    }

    /// Best-effort delete of a blob no document row points at.
    async fn discard(&self, key: &str, what: &str) {
        if let Err(e) = with_retry(&self.retry, what, || self.storage.delete(key)).await {
            log::error!("Orphaned blob {key} left in storage ({what}): {e}");
        }
    }

    /// Run CPU-bound document work off the async workers, bounded by the
    /// annotation timeout. A timeout is reported as a storage timeout.
    async fn run_blocking<T, F>(&self, what: &str, work: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AppError> + Send + 'static,
    {
        let limit = self.config.annotate_timeout;
        match tokio::time::timeout(limit, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("{what} aborted: {e}");
                Err(AppError::Format(format!("{what} failed on malformed input")))
            }
            Err(_) => {
                log::error!("{what} timed out after {}ms", limit.as_millis());
                Err(StorageError::Timeout(limit).into())
            }
        }
    }
}

fn ensure_pending(document: &Document) -> Result<(), AppError> {
    if document.status != DocumentStatus::Pending {
        return Err(AppError::Conflict(format!(
            "document {} is already {}",
            document.id,
            document.status.as_str()
        )));
    }
    Ok(())
}

fn validate_email(raw: &str) -> Result<&str, AppError> {
    let email = raw.trim();
    if email.len() > MAX_EMAIL_LEN {
        return Err(AppError::BadInput(format!(
            "signer email must be at most {MAX_EMAIL_LEN} characters"
        )));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(|c| c.is_whitespace() || c.is_control())
        }
        None => false,
    };
    if !valid {
        return Err(AppError::BadInput(format!("invalid signer email: {email:?}")));
    }
    Ok(email)
}
