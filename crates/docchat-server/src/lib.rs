//! HTTP surface of the document chat service.
//!
//! Routes:
//! - `POST /api/upload` multipart field `file`
//! - `POST /api/chat` multipart field `message`
//! - `GET /api/health`

pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use docchat_core::QaAgent;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Largest accepted request body (uploads included).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Mutex<QaAgent>>,
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(agent: QaAgent, upload_dir: PathBuf) -> Self {
        Self {
            agent: Arc::new(Mutex::new(agent)),
            upload_dir,
        }
    }
}

pub fn router(state: AppState, frontend_origin: &str) -> Result<Router> {
    let origin: HeaderValue = frontend_origin
        .parse()
        .map_err(|e| anyhow!("Invalid frontend origin {:?}: {}", frontend_origin, e))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/upload", post(handlers::upload))
        .route("/api/chat", post(handlers::chat))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state))
}
