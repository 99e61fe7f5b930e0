pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, routing::post};
use tower_http::services::ServeDir;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    /// Where uploaded files are written and served from
    pub upload_dir: PathBuf,
    /// Base URL clients use to reach this server, without trailing slash
    pub public_url: String,
}

impl AppStateInner {
    pub fn new(upload_dir: impl Into<PathBuf>, public_url: &str) -> AppState {
        Arc::new(Self {
            upload_dir: upload_dir.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }
}

/// `POST /upload` plus the `/uploads` file tree.
pub fn routes(state: AppState) -> Router {
    let files = ServeDir::new(&state.upload_dir);
    Router::new()
        .route("/upload", post(upload::upload_file))
        .nest_service("/uploads", files)
        .with_state(state)
}
