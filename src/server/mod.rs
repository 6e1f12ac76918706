//! HTTP service exposing the flatten transform.
//!
//! | Method | Path       | Purpose                                   |
//! |--------|------------|-------------------------------------------|
//! | GET    | `/healthz` | liveness probe, always `{"ok": true}`     |
//! | POST   | `/flatten` | flatten the uploaded PDF (`?dpi=72..600`) |
//!
//! A semaphore admits at most `max_concurrency` requests to the flatten
//! service at once; the rest wait for a permit. The request timeout counts
//! from the moment the upload has been read, so it covers the wait for a
//! permit as well as the transform. Each admitted request holds its permit
//! until the transform has finished, even if the client was already
//! answered with a timeout.

pub mod error;
pub mod handlers;

use crate::config::Dpi;
use crate::flatten::FlattenService;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Tunables for the HTTP service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Wall-clock limit for one flatten, including the wait for a permit.
    pub timeout: Duration,
    /// Requests handed to the flatten service concurrently.
    pub max_concurrency: usize,
    /// DPI used when the request names none.
    pub default_dpi: Dpi,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024,
            timeout: Duration::from_secs(300),
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            default_dpi: Dpi::DEFAULT,
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn FlattenService>,
    pub default_dpi: Dpi,
    pub timeout: Duration,
    pub permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(service: Arc<dyn FlattenService>, config: &ServerConfig) -> Self {
        Self {
            service,
            default_dpi: config.default_dpi,
            timeout: config.timeout,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
        }
    }
}

/// Build the service router.
pub fn router(service: Arc<dyn FlattenService>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/flatten", post(handlers::flatten))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(service, config))
}
