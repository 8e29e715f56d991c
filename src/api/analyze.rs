use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::analyzer::AnalyzeOptions;
use crate::api::error_response;
use crate::models::{AnalyzeRequest, CompanyReport};
use crate::state::AppState;

/// POST /api/analyze - Run the full analysis pipeline for one company
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<CompanyReport>, (StatusCode, String)> {
    if req.company_name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Company name is required".to_string()));
    }

    let Some(analyzer) = state.analyzer.clone() else {
        let message = state
            .setup_error
            .clone()
            .unwrap_or_else(|| "Analyzer is not configured".to_string());
        return Err((StatusCode::INTERNAL_SERVER_ERROR, message));
    };

    let _permit = state
        .analyze_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Analysis service at capacity".to_string(),
            )
        })?;

    let options = AnalyzeOptions {
        num_results: req.num_results,
        structured: req.structured,
    };
    let report = analyzer
        .analyze_with(&req.company_name, &options)
        .await
        .map_err(error_response)?;

    tracing::info!(
        "Analysis of '{}' complete: {} sources",
        report.company_name,
        report.sources.len()
    );
    Ok(Json(report))
}
