//! Integration tests against a real Postgres database.
//!
//! Skipped unless DATABASE_URL is set. Each test works on its own owner id
//! so tests can share one database.

mod common;

use countersign::auth::Requester;
use countersign::config::Config;
use countersign::db;
use countersign::errors::ErrorKind;
use countersign::models::audit::PgAuditLog;
use countersign::models::document::{DocumentRepository, DocumentStatus, PgDocuments};
use countersign::models::signature::{PgPlacements, PlacementRepository};
use countersign::signing::{FinalizeRequest, SignatureMark, SigningService, ViewerPoint};
use countersign::storage::MemoryBlobStore;
use common::*;
use sqlx::PgPool;

type PgService = SigningService<PgDocuments, PgPlacements, MemoryBlobStore, PgAuditLog>;

/// Connect and migrate, or `None` when no database is configured.
async fn setup_pg() -> Option<(PgPool, PgService)> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            println!("[SKIP] DATABASE_URL not set");
            return None;
        }
    };
    init_logging();

    let config = Config {
        database_url: url,
        ..fast_config()
    };
    let pool = db::init_pool(&config).await.expect("Failed to connect to test DB");
    db::run_migrations(&pool).await.expect("Failed to run migrations");

    let service = SigningService::new(
        config,
        PgDocuments::new(pool.clone()),
        PgPlacements::new(pool.clone()),
        MemoryBlobStore::new(),
        PgAuditLog::new(pool.clone()),
    );
    Some((pool, service))
}

fn unique_owner() -> i64 {
    1_000_000 + (rand::random::<u32>() as i64)
}

#[tokio::test]
async fn test_pg_full_signing_flow() {
    let Some((_pool, service)) = setup_pg().await else {
        return;
    };
    let owner_id = unique_owner();

    let document = service
        .upload_document(owner_id, "pg.pdf", sample_pdf(LETTER.0, LETTER.1), origin())
        .await
        .unwrap();
    let request = service
        .issue_public_token(document.id, owner_id, SIGNER_EMAIL, origin())
        .await
        .unwrap();

    let found = service
        .documents()
        .find_by_public_token(&request.token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, document.id);
    assert_eq!(found.signer_email.as_deref(), Some(SIGNER_EMAIL));

    let bearer = Requester::bearer(request.token.clone());
    service
        .create_placement(document.id, &bearer, ViewerPoint::new(100.0, 100.0).unwrap(), 0, origin())
        .await
        .unwrap();

    service
        .finalize(FinalizeRequest {
            document_id: document.id,
            requester: bearer.clone(),
            point: ViewerPoint::new(100.0, 100.0).unwrap(),
            mark: SignatureMark::text("Postgres Signer").unwrap(),
            origin: origin(),
        })
        .await
        .unwrap();

    let signed = service.documents().find_by_id(document.id).await.unwrap().unwrap();
    assert_eq!(signed.status, DocumentStatus::Signed);
    let placements = service.placements().list_for_document(document.id).await.unwrap();
    assert_eq!(placements[0].status, DocumentStatus::Signed);
    assert_eq!(placements[0].signer_id, None);

    let trail: Vec<String> = service
        .audit_trail(document.id, owner_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        trail,
        vec![
            "DOCUMENT_SIGNED_AND_FINALIZED",
            "SIGNATURE_POSITION_CREATED",
            "SIGNATURE_REQUEST_SENT",
            "DOCUMENT_UPLOADED"
        ]
    );

    let again = service
        .finalize(FinalizeRequest {
            document_id: document.id,
            requester: bearer,
            point: ViewerPoint::new(1.0, 1.0).unwrap(),
            mark: SignatureMark::text("Twice").unwrap(),
            origin: origin(),
        })
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::Conflict);

    println!("[PASS] test_pg_full_signing_flow");
}

#[tokio::test]
async fn test_pg_compare_and_set_status() {
    let Some((_pool, service)) = setup_pg().await else {
        return;
    };
    let owner_id = unique_owner();
    let document = service
        .upload_document(owner_id, "cas.pdf", sample_pdf(300, 300), origin())
        .await
        .unwrap();

    let repo = service.documents();
    assert!(repo
        .compare_and_set_status(document.id, DocumentStatus::Pending, DocumentStatus::Rejected)
        .await
        .unwrap());
    assert!(!repo
        .compare_and_set_status(document.id, DocumentStatus::Pending, DocumentStatus::Signed)
        .await
        .unwrap());
    assert!(!repo
        .compare_and_set_status(document.id, DocumentStatus::Rejected, DocumentStatus::Pending)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_pg_duplicate_token_is_conflict() {
    let Some((_pool, service)) = setup_pg().await else {
        return;
    };
    let owner_id = unique_owner();
    let a = service
        .upload_document(owner_id, "a.pdf", sample_pdf(300, 300), origin())
        .await
        .unwrap();
    let b = service
        .upload_document(owner_id, "b.pdf", sample_pdf(300, 300), origin())
        .await
        .unwrap();
    let request = service
        .issue_public_token(a.id, owner_id, SIGNER_EMAIL, origin())
        .await
        .unwrap();

    let err = service
        .documents()
        .attach_signature_request(b.id, &request.token, SIGNER_EMAIL)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_pg_audit_events_are_append_only() {
    let Some((pool, service)) = setup_pg().await else {
        return;
    };
    let owner_id = unique_owner();
    let document = service
        .upload_document(owner_id, "audit.pdf", sample_pdf(300, 300), origin())
        .await
        .unwrap();

    let update = sqlx::query("UPDATE audit_events SET action = 'TAMPERED' WHERE document_id = $1")
        .bind(document.id)
        .execute(&pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM audit_events WHERE document_id = $1")
        .bind(document.id)
        .execute(&pool)
        .await;
    assert!(delete.is_err());

    let trail = service.audit_trail(document.id, owner_id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, "DOCUMENT_UPLOADED");
}
