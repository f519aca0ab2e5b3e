//! End-to-end signing against on-disk storage and the queued audit sink.

mod common;

use countersign::audit::{AuditSink, QueuedAuditSink};
use countersign::errors::ErrorKind;
use countersign::models::audit::InMemoryAuditLog;
use countersign::models::document::{DocumentRepository, DocumentStatus, InMemoryDocuments};
use countersign::models::signature::InMemoryPlacements;
use countersign::signing::{FinalizeRequest, SignatureMark, SigningService, ViewerPoint};
use countersign::storage::LocalBlobStore;
use common::*;

type DiskService = SigningService<
    InMemoryDocuments,
    InMemoryPlacements,
    LocalBlobStore,
    QueuedAuditSink<InMemoryAuditLog>,
>;

async fn disk_service(root: &std::path::Path) -> DiskService {
    init_logging();
    let store = LocalBlobStore::open(root.join("documents")).await.unwrap();
    SigningService::new(
        fast_config(),
        InMemoryDocuments::new(),
        InMemoryPlacements::new(),
        store,
        QueuedAuditSink::new(InMemoryAuditLog::new()),
    )
}

#[tokio::test]
async fn test_sign_document_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let service = disk_service(dir.path()).await;

    let document = service
        .upload_document(OWNER_ID, "deed.pdf", sample_pdf(595, 842), origin())
        .await
        .unwrap();
    let path = service.storage().root().join(&document.binary_ref);
    assert!(path.exists());

    let request = service
        .issue_public_token(document.id, OWNER_ID, SIGNER_EMAIL, origin())
        .await
        .unwrap();
    let outcome = service
        .finalize(FinalizeRequest {
            document_id: document.id,
            requester: countersign::auth::Requester::bearer(request.token),
            point: ViewerPoint::new(0.0, 0.0).unwrap(),
            mark: SignatureMark::text("Grace Hopper").unwrap(),
            origin: origin(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.status, DocumentStatus::Signed);

    // The signed copy replaces the upload: one file, no stray temp files.
    let signed = service.documents().find_by_id(document.id).await.unwrap().unwrap();
    assert_ne!(signed.binary_ref, document.binary_ref);
    assert!(!path.exists());
    let on_disk = stored_via(service.storage(), &signed.binary_ref).await;
    assert!(contains(&on_disk, "Digitally Signed by: Grace Hopper"));
    let entries: Vec<_> = std::fs::read_dir(service.storage().root())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 1);

    // Drain the queue before reading the trail.
    service.audit().sink().shutdown().await;
    let actions: Vec<String> = service
        .audit()
        .sink()
        .inner()
        .list_for_document(document.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            "DOCUMENT_UPLOADED",
            "SIGNATURE_REQUEST_SENT",
            "DOCUMENT_SIGNED_AND_FINALIZED"
        ]
    );

    println!("[PASS] test_sign_document_on_disk");
}

#[tokio::test]
async fn test_deleted_file_is_reported_as_missing_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let service = disk_service(dir.path()).await;
    let document = service
        .upload_document(OWNER_ID, "deed.pdf", sample_pdf(595, 842), origin())
        .await
        .unwrap();

    std::fs::remove_file(service.storage().root().join(&document.binary_ref)).unwrap();

    let err = service.download(document.id, &owner()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("Stored document missing"));
}

#[tokio::test]
async fn test_audit_after_shutdown_is_only_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let service = disk_service(dir.path()).await;
    service.audit().sink().shutdown().await;

    // The upload itself still succeeds.
    let document = service
        .upload_document(OWNER_ID, "deed.pdf", sample_pdf(595, 842), origin())
        .await
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Pending);
}
