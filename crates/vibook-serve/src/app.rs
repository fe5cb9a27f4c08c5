use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;
use vibook_vqa::host::ModelHost;

use crate::handlers;
use crate::page::PageRenderer;

/// Shared state of the request handlers.
#[derive(Clone)]
pub struct AppState {
    pub host: Arc<ModelHost>,
    pub pages: Arc<PageRenderer>,
}

/// The upload limit in bytes for a limit in megabytes, saturating on overflow.
pub fn upload_limit_bytes(megabytes: usize) -> usize {
    megabytes.saturating_mul(1024 * 1024)
}

/// Build the application router.
///
/// # Arguments
///
/// * `state` - The model host and page renderer.
/// * `static_dir` - Served under `/static`.
/// * `assets_dir` - Served under `/assets`.
/// * `max_upload_bytes` - The request body limit of the upload route.
pub fn router(
    state: AppState,
    static_dir: &Path,
    assets_dir: &Path,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/vqa", post(handlers::vqa))
        .nest_service("/static", ServeDir::new(static_dir))
        .nest_service("/assets", ServeDir::new(assets_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
