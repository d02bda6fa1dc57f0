//! tally-ri library - Results Ingest service
//!
//! Accepts survey submissions over HTTP, merges them into per-survey
//! results tables with schema evolution, and serves the tables back as
//! JSON rows, raw CSV, or a zip archive with attachments.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::path::Path;
use tally_common::EventBus;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod results;

pub use error::{ApiError, ApiResult};

use results::{
    ArchiveAssembler, AttachmentStore, GatePolicy, IngestionEngine, ResultsGate, ResultsReader,
};

/// Largest accepted request body (multipart submissions with attachments)
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: IngestionEngine,
    pub reader: ResultsReader,
    pub assembler: ArchiveAssembler,
    pub attachments: AttachmentStore,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// State over `data_dir` (the folder holding results tables and `surveys.json`)
    pub fn new(data_dir: &Path, gate_policy: GatePolicy, event_bus: EventBus) -> Self {
        Self {
            engine: IngestionEngine::new(data_dir, ResultsGate::new(gate_policy), event_bus.clone()),
            reader: ResultsReader::new(data_dir),
            assembler: ArchiveAssembler::new(data_dir),
            attachments: AttachmentStore::new(data_dir),
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        // Results
        .route(
            "/api/surveys/:id/results",
            get(api::get_results).post(api::submit_results),
        )
        .route("/api/surveys/:id/results-csv", get(api::get_results_csv))
        .route("/api/surveys/:id/archive", get(api::download_archive))
        .route("/api/surveys/files/:filename", get(api::get_attachment))
        // SSE
        .route("/api/events", get(api::event_stream))
        .route("/events", get(api::status_stream))
        // Build information
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
