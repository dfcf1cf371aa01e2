use axum::{Json, Router, extract::State, routing::post};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    ingest::{ExtractedText, bound_text, extract_text_blocking},
    interpret::{AiDetectionReport, interpret_ai_detection},
    prompts::ai_detection_prompt,
    web::{
        ApiError, AppState, FileFieldConfig, JsonOrMultipart, read_submission_form,
    },
};

use super::run_prompt;

const MISSING_INPUT: &str = "Either text or file must be provided";

pub fn router() -> Router<AppState> {
    Router::new().route("/check-ai", post(check_ai))
}

#[derive(Debug, Default, Deserialize)]
struct CheckAiRequest {
    #[serde(default)]
    text: Option<String>,
}

async fn check_ai(
    State(state): State<AppState>,
    body: JsonOrMultipart<CheckAiRequest>,
) -> Result<Json<AiDetectionReport>, ApiError> {
    let request_id = Uuid::new_v4();
    let text = submission_text(request_id, body).await?;

    let settings = state.settings();
    let bounded = bound_text(text.as_str(), settings.bounds.ai_check_chars);
    let sentences = bounded.sentences(settings.bounds.max_sentences);
    info!(
        %request_id,
        chars = text.char_len(),
        truncated = bounded.was_truncated(),
        sentences = sentences.len(),
        "running AI detection"
    );

    let llm = state.llm_client();
    let response = run_prompt(
        llm.as_ref(),
        &settings.models.detection_model,
        settings.generation.detection,
        ai_detection_prompt(bounded.as_str()),
    )
    .await?;

    let report = interpret_ai_detection(&response.text, sentences.len());
    info!(
        %request_id,
        ai_detected = report.ai_detected,
        confidence = report.confidence,
        "AI detection finished"
    );

    Ok(Json(report))
}

async fn submission_text(
    request_id: Uuid,
    body: JsonOrMultipart<CheckAiRequest>,
) -> Result<ExtractedText, ApiError> {
    match body {
        JsonOrMultipart::Json(request) => {
            let text = request
                .text
                .ok_or_else(|| ApiError::bad_request(MISSING_INPUT))?;
            Ok(ExtractedText::from_text(&text)?)
        }
        JsonOrMultipart::Multipart(multipart) => {
            let mut form =
                read_submission_form(multipart, &[FileFieldConfig::optional("file")]).await?;

            if let Some(file) = form.take_file("file") {
                info!(%request_id, filename = %file.display_name, bytes = file.bytes.len(), "file submitted for AI check");
                return Ok(extract_text_blocking(file.bytes, file.original_name).await?);
            }

            let text = form
                .first_text("text")
                .ok_or_else(|| ApiError::bad_request(MISSING_INPUT))?;
            Ok(ExtractedText::from_text(text)?)
        }
    }
}
