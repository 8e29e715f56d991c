use axum::extract::State;
use axum::Json;

use crate::config::RedactedConfig;
use crate::state::AppState;

/// GET /api/config - Current configuration with keys redacted
pub async fn get_config(State(state): State<AppState>) -> Json<RedactedConfig> {
    Json(state.config.redacted())
}
