//! Axum HTTP handlers.

pub mod analyze;
pub mod config;

use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;

use crate::error::Error;
use crate::state::AppState;

/// All routes, with the bundled UI as the fallback.
pub fn router(state: AppState) -> Router {
    // No CORS layer: the UI is served from the same origin.
    Router::new()
        .route("/", get(serve_index))
        .route("/api/analyze", post(analyze::analyze))
        .route("/api/config", get(config::get_config))
        .with_state(state)
        .fallback(get(serve_index))
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

/// Map a pipeline error to the response the handlers return.
pub fn error_response(err: Error) -> (StatusCode, String) {
    let status = err.status_code();
    if err.is_transient() {
        tracing::warn!("Analysis failed, upstream may recover: {err}");
    } else if status.is_server_error() {
        tracing::error!("Analysis failed: {err}");
    } else {
        tracing::warn!("Analysis rejected: {err}");
    }
    (status, err.to_string())
}
