use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    ingest::bound_text,
    interpret::strip_code_fences,
    prompts::quick_analysis_prompt,
    web::{ApiError, ApiJson, AppState},
};

use super::run_prompt;

pub fn router() -> Router<AppState> {
    Router::new().route("/analyze", post(analyze))
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    analysis: String,
}

async fn analyze(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let text = request
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ApiError::bad_request("text is required"))?;

    let settings = state.settings();
    let bounded = bound_text(text, settings.bounds.analyze_chars);
    info!(chars = bounded.char_len(), truncated = bounded.was_truncated(), "quick analysis");

    let llm = state.llm_client();
    let response = run_prompt(
        llm.as_ref(),
        &settings.models.analysis_model,
        settings.generation.analysis,
        quick_analysis_prompt(bounded.as_str()),
    )
    .await?;

    Ok(Json(AnalyzeResponse {
        analysis: strip_code_fences(&response.text),
    }))
}
