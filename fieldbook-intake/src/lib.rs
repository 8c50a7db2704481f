//! fieldbook-intake - inbound document intake service
//!
//! Receives gateway webhook deliveries (text plus optional photo) from
//! field workers, runs the intake pipeline, and replies. Exposed as a
//! library so integration tests can drive the router and the pipeline with
//! stub services.

pub mod api;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use crate::config::IntakeConfig;
use crate::conversation::MessagePatterns;
use crate::services::{MediaFetcher, ReceiptExtractor};
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<IntakeConfig>,
    /// Attachment retrieval (stubbed in tests)
    pub fetcher: Arc<dyn MediaFetcher>,
    /// External recognition service (stubbed in tests)
    pub extractor: Arc<dyn ReceiptExtractor>,
    /// Free-text phrase matching
    pub patterns: Arc<dyn MessagePatterns>,
    /// Per-sender locks serializing conversation transitions. Two messages
    /// from one sender process in arrival order; different senders never
    /// contend.
    sender_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: IntakeConfig,
        fetcher: Arc<dyn MediaFetcher>,
        extractor: Arc<dyn ReceiptExtractor>,
        patterns: Arc<dyn MessagePatterns>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            fetcher,
            extractor,
            patterns,
            sender_locks: Arc::new(Mutex::new(HashMap::new())),
            startup_time: Utc::now(),
        }
    }

    /// The lock serializing this sender's transitions.
    pub async fn sender_lock(&self, contact: &str) -> Arc<Mutex<()>> {
        let mut locks = self.sender_locks.lock().await;
        locks
            .entry(contact.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
