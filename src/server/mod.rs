//! HTTP API.
//!
//! Wires the quota, retention and note store services into an axum router.
//! `serve` also owns the retention scheduler for the lifetime of the
//! listener.

pub mod audio;
pub mod auth;
pub mod error;
pub mod notes;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::{NoteProcessor, PlaceholderProcessor};
use crate::config::{ResolvedConfig, DEFAULT_MAX_UPLOAD_BYTES};
use crate::quota::{QuotaLedger, UploadAdmission};
use crate::retention::{LocalAudioStorage, RetentionPolicy, RetentionSweeper, Scheduler};
use crate::store::SqliteStore;

pub use auth::{AuthUser, MaybeAuthUser, Principal, StaticTokenVerifier, TokenVerifier};
pub use error::{ApiError, ApiResult};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub ledger: Arc<QuotaLedger>,
    pub admission: Arc<UploadAdmission>,
    pub audio: Arc<LocalAudioStorage>,
    pub sweeper: Arc<RetentionSweeper>,
    pub processor: Arc<dyn NoteProcessor>,
    pub tokens: Arc<dyn TokenVerifier>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Build the service graph over a store and an audio directory. The
    /// sweeper reports deletions back to the store so swept notes stop
    /// counting against quota.
    pub fn new(
        store: Arc<SqliteStore>,
        audio: Arc<LocalAudioStorage>,
        tokens: Arc<dyn TokenVerifier>,
        policy: RetentionPolicy,
    ) -> Self {
        let ledger = Arc::new(QuotaLedger::new(store.clone()));
        let admission = Arc::new(UploadAdmission::new(Arc::clone(&ledger)));
        let sweeper = Arc::new(RetentionSweeper::new(audio.clone(), policy).with_hook(store.clone()));

        Self {
            store,
            ledger,
            admission,
            audio,
            sweeper,
            processor: Arc::new(PlaceholderProcessor::new()),
            tokens,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Swap the transcription/summarization backend
    pub fn with_processor(mut self, processor: Arc<dyn NoteProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(health))
        .route("/transcribe", post(audio::transcribe))
        .route("/summarize", post(audio::summarize))
        .route("/audio/cleanup-status", get(audio::cleanup_status))
        .route("/audio/cleanup-now", post(audio::cleanup_now))
        .route("/storage", get(storage::get_storage))
        .route("/storage/limit/:user_id", put(storage::set_limit))
        .route("/notes", get(notes::list_notes))
        .route("/notes/search/:term", get(notes::search_notes))
        .route("/notes/:id", get(notes::get_note).delete(notes::delete_note))
        .route("/notes/:id/audio", get(notes::get_note_audio))
        .route("/categories", get(notes::list_categories).post(notes::create_category))
        .route("/stats", get(notes::get_stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
    }))
}

/// Run the API until Ctrl-C, with the retention scheduler alongside
pub async fn serve(config: &ResolvedConfig) -> Result<()> {
    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("Failed to open database {}", config.database_path.display()))?,
    );
    let audio = Arc::new(LocalAudioStorage::new(config.audio_dir.clone()));
    let tokens: Arc<dyn TokenVerifier> = Arc::new(StaticTokenVerifier::from_config(&config.auth));

    let state = AppState::new(store, audio, tokens, config.retention)
        .with_max_upload_bytes(config.max_upload_bytes);

    let mut scheduler = Scheduler::from_policy(Arc::clone(&state.sweeper));
    scheduler.start();

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        bind = %config.bind,
        audio_dir = %config.audio_dir.display(),
        "Listening"
    );

    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.stop().await?;
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
