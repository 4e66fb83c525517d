//! HTTP API consumed by the dashboard.

pub mod auth;
pub mod error;
pub mod handlers;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::copilot::Copilot;
use crate::core::db::FraudDb;
use crate::core::evidence::EvidenceStore;
use crate::detection::{DocumentAnalyzer, ocr};

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: FraudDb,
    pub analyzer: Arc<DocumentAnalyzer>,
    pub copilot: Arc<Copilot>,
    pub evidence: EvidenceStore,
}

impl AppState {
    pub fn new(config: Config, db: FraudDb, analyzer: DocumentAnalyzer, copilot: Copilot) -> Self {
        let evidence = EvidenceStore::new(config.storage.upload_dir.clone());
        Self {
            config: Arc::new(config),
            db,
            analyzer: Arc::new(analyzer),
            copilot: Arc::new(copilot),
            evidence,
        }
    }

    /// Open the database, the OCR engine and the copilot as configured
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = FraudDb::new(config.storage.database_path()?).await?;
        let analyzer = DocumentAnalyzer::new(config.analyzer_settings(), ocr::extractor_for(&config.ocr));
        let copilot = Copilot::init(&db, &config.copilot).await?;
        Ok(Self::new(config, db, analyzer, copilot))
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::root))
        .route("/upload", post(handlers::upload_document))
        .route("/analyze", post(handlers::analyze_document))
        .route("/analyze-batch", post(handlers::analyze_batch))
        .route("/copilot-chat", post(handlers::copilot_chat))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until Ctrl-C
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let db = state.db.clone();
    info!("API listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    db.close().await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
