//! Shared harness for integration tests: stub services, a file-backed
//! database in a temp dir, and message builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;

use fieldbook_intake::config::{ConfirmMode, IntakeConfig};
use fieldbook_intake::conversation::DefaultPatterns;
use fieldbook_intake::db::receipts::ReceiptRow;
use fieldbook_intake::services::{ExtractError, MediaError, MediaFetcher, ReceiptExtractor};
use fieldbook_intake::types::{AttachmentRef, FetchedMedia, InboundMessage};
use fieldbook_intake::AppState;

/// Fetcher returning deterministic bytes derived from the attachment URL,
/// so distinct attachments hash distinctly and a re-sent URL reproduces an
/// exact duplicate. `fail: true` simulates a gateway outage.
pub struct StubFetcher {
    pub fail: bool,
}

#[async_trait]
impl MediaFetcher for StubFetcher {
    async fn fetch(&self, attachment: &AttachmentRef) -> Result<FetchedMedia, MediaError> {
        if self.fail {
            return Err(MediaError::Download("gateway unreachable (stub)".to_string()));
        }
        let seed = if attachment.url.is_empty() {
            b"stub".as_slice()
        } else {
            attachment.url.as_bytes()
        };
        let mut bytes = Vec::with_capacity(16 * 1024);
        while bytes.len() < 16 * 1024 {
            bytes.extend_from_slice(seed);
        }
        bytes.truncate(16 * 1024);
        Ok(FetchedMedia {
            bytes,
            content_type: Some("image/jpeg".to_string()),
        })
    }
}

pub enum StubResponse {
    Payload(String),
    Outage,
}

/// Extractor replaying a queue of canned responses; an exhausted queue (or
/// a queued `Outage`) behaves as a transport failure.
pub struct StubExtractor {
    queue: StdMutex<VecDeque<StubResponse>>,
}

impl StubExtractor {
    pub fn payloads(payloads: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            queue: StdMutex::new(
                payloads
                    .iter()
                    .map(|p| StubResponse::Payload(p.to_string()))
                    .collect(),
            ),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            queue: StdMutex::new(VecDeque::new()),
        })
    }
}

#[async_trait]
impl ReceiptExtractor for StubExtractor {
    async fn extract(&self, _image: &[u8], _content_type: &str) -> Result<String, ExtractError> {
        match self.queue.lock().unwrap().pop_front() {
            Some(StubResponse::Payload(payload)) => Ok(payload),
            Some(StubResponse::Outage) | None => {
                Err(ExtractError::Transport("extraction service outage (stub)".to_string()))
            }
        }
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub pool: SqlitePool,
    // Keeps the data dir alive for the duration of the test
    pub data_dir: TempDir,
}

pub async fn harness(
    mode: ConfirmMode,
    auto_register: bool,
    extractor: Arc<StubExtractor>,
) -> TestHarness {
    harness_with_fetcher(mode, auto_register, extractor, Arc::new(StubFetcher { fail: false }))
        .await
}

pub async fn harness_with_fetcher(
    mode: ConfirmMode,
    auto_register: bool,
    extractor: Arc<StubExtractor>,
    fetcher: Arc<StubFetcher>,
) -> TestHarness {
    let data_dir = TempDir::new().unwrap();
    let pool = fieldbook_common::db::init::init_database(&data_dir.path().join("fieldbook.db"))
        .await
        .unwrap();

    let mut config = IntakeConfig::default();
    config.data_dir = data_dir.path().to_path_buf();
    config.confirm_mode = mode;
    config.auto_register = auto_register;

    let state = AppState::new(
        pool.clone(),
        config,
        fetcher,
        extractor,
        Arc::new(DefaultPatterns),
    );
    TestHarness {
        state,
        pool,
        data_dir,
    }
}

pub async fn seed_projects(pool: &SqlitePool, names: &[&str]) {
    for name in names {
        sqlx::query("INSERT OR IGNORE INTO projects (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
    }
}

pub async fn register_worker(pool: &SqlitePool, contact: &str, name: &str) -> i64 {
    fieldbook_intake::db::workers::register(pool, contact, name)
        .await
        .unwrap()
        .id
}

pub fn photo_msg(message_id: &str, sender: &str, body: &str, url: &str) -> InboundMessage {
    InboundMessage {
        message_id: message_id.to_string(),
        sender: sender.to_string(),
        destination: "+18635550000".to_string(),
        body: body.to_string(),
        media: vec![AttachmentRef {
            url: url.to_string(),
            content_type: "image/jpeg".to_string(),
        }],
    }
}

pub fn text_msg(message_id: &str, sender: &str, body: &str) -> InboundMessage {
    InboundMessage {
        message_id: message_id.to_string(),
        sender: sender.to_string(),
        destination: "+18635550000".to_string(),
        body: body.to_string(),
        media: Vec::new(),
    }
}

pub async fn receipts_for_worker(pool: &SqlitePool, worker_id: i64) -> Vec<ReceiptRow> {
    sqlx::query_as::<_, ReceiptRow>(
        r#"
        SELECT id, worker_id, project_id, matched_project_name, project_match_score,
               category_id, vendor_name, vendor_city, vendor_state, purchase_date,
               subtotal_cents, tax_cents, total_cents, payment_method, image_path,
               image_hash, raw_extraction, status, flag_reason, duplicate_of,
               is_missed_receipt, context, confirmed_at
        FROM receipts WHERE worker_id = ? ORDER BY id
        "#,
    )
    .bind(worker_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

pub async fn category_id(pool: &SqlitePool, name: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as("SELECT id FROM categories WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap();
    id
}

pub async fn worker_count(pool: &SqlitePool) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workers")
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

/// The Home Depot example payload: $39.41 + $2.76 = $42.17, Materials.
pub fn home_depot_payload() -> &'static str {
    r#"{
        "vendor_name": "Home Depot",
        "vendor_city": "Kissimmee",
        "vendor_state": "FL",
        "purchase_date": "2026-02-18",
        "subtotal": 39.41,
        "tax": 2.76,
        "total": 42.17,
        "payment_method": "VISA 1234",
        "category": "Materials",
        "line_items": [
            {"item_name": "2x4 Lumber", "quantity": 6, "unit_price": 3.98, "extended_price": 23.88},
            {"item_name": "Deck Screws", "quantity": 1, "unit_price": 15.53, "extended_price": 15.53}
        ]
    }"#
}
