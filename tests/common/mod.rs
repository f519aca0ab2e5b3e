//! Shared test infrastructure for the signing workflow tests.
//!
//! # Fixtures
//! - `sample_pdf()` / `multi_page_pdf()` - small PDFs built with lopdf
//! - `signature_png()` / `signature_data_url()` - a canvas-style drawn signature
//! - `memory_service()` - a `SigningService` over in-process backends with fast retries

#![allow(dead_code)]

use std::time::Duration;

use lopdf::{Object, Stream, dictionary};

use countersign::audit::AuditSink;
use countersign::auth::Requester;
use countersign::config::Config;
use countersign::models::audit::{InMemoryAuditLog, RequestOrigin};
use countersign::models::document::{Document, DocumentRepository, InMemoryDocuments};
use countersign::models::signature::InMemoryPlacements;
use countersign::signing::SigningService;
use countersign::storage::{BlobStore, MemoryBlobStore};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

pub const OWNER_ID: i64 = 1;
pub const OTHER_USER_ID: i64 = 2;
pub const SIGNER_EMAIL: &str = "signer@example.com";
pub const LETTER: (i64, i64) = (612, 792);

pub type MemoryService =
    SigningService<InMemoryDocuments, InMemoryPlacements, MemoryBlobStore, InMemoryAuditLog>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Defaults with retries short enough for tests.
pub fn fast_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        frontend_url: "https://sign.example.com".to_string(),
        storage_attempts: 3,
        storage_timeout: Duration::from_millis(200),
        retry_backoff: Duration::from_millis(1),
        annotate_timeout: Duration::from_secs(10),
        ..Config::default()
    }
}

pub fn memory_service() -> MemoryService {
    init_logging();
    SigningService::new(
        fast_config(),
        InMemoryDocuments::new(),
        InMemoryPlacements::new(),
        MemoryBlobStore::new(),
        InMemoryAuditLog::new(),
    )
}

pub fn origin() -> RequestOrigin {
    RequestOrigin::new("203.0.113.9", "Mozilla/5.0 (test)")
}

pub fn owner() -> Requester {
    Requester::Owner {
        user_id: OWNER_ID,
        display_name: Some("Olivia Owner".to_string()),
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// One-page PDF with some body text.
pub fn sample_pdf(width: i64, height: i64) -> Vec<u8> {
    multi_page_pdf(width, height, 1)
}

/// PDF whose page `n` (1-based) shows the text `Page n body`.
pub fn multi_page_pdf(width: i64, height: i64, pages: usize) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids = Vec::new();
    for n in 1..=pages {
        let content = format!("BT /F1 12 Tf 72 700 Td (Page {n} body) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Count" => pages as i64,
        "Kids" => kids,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("Failed to build sample PDF");
    out
}

/// A 30x10 dark stroke on a transparent background.
pub fn signature_png() -> Vec<u8> {
    let img = image::RgbaImage::from_fn(30, 10, |x, y| {
        if y == 5 || x == y {
            image::Rgba([20, 20, 80, 255])
        } else {
            image::Rgba([0, 0, 0, 0])
        }
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}

pub fn signature_data_url() -> String {
    use base64::Engine;
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(signature_png())
    )
}

// ============================================================================
// WORKFLOW HELPERS
// ============================================================================

/// Upload a letter-size PDF owned by `OWNER_ID`.
pub async fn upload(service: &MemoryService) -> Document {
    service
        .upload_document(OWNER_ID, "contract.pdf", sample_pdf(LETTER.0, LETTER.1), origin())
        .await
        .expect("Failed to upload sample document")
}

/// Upload a document and open a signature request for it.
pub async fn upload_and_request(service: &MemoryService) -> (Document, String) {
    let document = upload(service).await;
    let request = service
        .issue_public_token(document.id, OWNER_ID, SIGNER_EMAIL, origin())
        .await
        .expect("Failed to issue public token");
    (document, request.token)
}

/// Bytes the document currently points at, read without failure injection.
pub async fn stored(service: &MemoryService, document: &Document) -> Vec<u8> {
    let current = current_ref(service, document.id).await;
    service
        .storage()
        .snapshot(&current)
        .expect("Document bytes missing from store")
}

/// The document's `binary_ref` as the repository holds it now.
pub async fn current_ref(service: &MemoryService, document_id: i64) -> String {
    service
        .documents()
        .find_by_id(document_id)
        .await
        .expect("Failed to load document")
        .expect("Document row missing")
        .binary_ref
}

pub async fn stored_via<B: BlobStore>(store: &B, key: &str) -> Vec<u8> {
    store.read(key).await.expect("Document bytes missing from store")
}

/// Audit actions recorded for a document, oldest first.
pub async fn actions(service: &MemoryService, document_id: i64) -> Vec<String> {
    service
        .audit()
        .sink()
        .list_for_document(document_id)
        .await
        .expect("Failed to list audit events")
        .into_iter()
        .map(|event| event.action)
        .collect()
}

pub fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_bytes())
}

/// Raw content of page `n` (1-based).
pub fn page_content(pdf: &[u8], n: u32) -> Vec<u8> {
    let doc = lopdf::Document::load_mem(pdf).expect("Failed to parse PDF");
    let page_id = *doc.get_pages().get(&n).expect("Page missing");
    doc.get_page_content(page_id).expect("Failed to read page content")
}
