use axum::{Json, Router, extract::{Multipart, State}, routing::post};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    ingest::{bound_text, extract_text_blocking},
    interpret::{extract_score, strip_markdown_emphasis},
    prompts::{TaskType, feedback_prompt},
    web::{ApiError, AppState, FileFieldConfig, read_submission_form},
};

use super::run_prompt;

const FILE_FIELD: &str = "file";
const RUBRIC_FILE_FIELD: &str = "rubric_file";

pub fn router() -> Router<AppState> {
    Router::new().route("/upload", post(upload))
}

#[derive(Debug, Serialize)]
struct FeedbackResponse {
    score: u8,
    feedback: String,
    task_type: String,
    filename: String,
}

async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let settings = state.settings();

    let mut form = read_submission_form(
        multipart,
        &[
            FileFieldConfig::optional(FILE_FIELD).with_min_files(1),
            FileFieldConfig::optional(RUBRIC_FILE_FIELD),
        ],
    )
    .await?;

    let task_label = form
        .first_text("task_type")
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("task_type is required"))?;
    let task = TaskType::parse(&task_label);

    let rubric = match form.take_file(RUBRIC_FILE_FIELD) {
        Some(rubric_file) => {
            let text = extract_text_blocking(rubric_file.bytes, rubric_file.original_name).await?;
            Some(text.into_string())
        }
        None => form.first_text("rubric").map(str::to_string),
    };

    let Some(file) = form.take_file(FILE_FIELD) else {
        return Err(ApiError::bad_request("file is required"));
    };
    let filename = file.display_name.clone();
    let text = extract_text_blocking(file.bytes, file.original_name).await?;
    let bounded = bound_text(text.as_str(), settings.bounds.feedback_chars);

    info!(
        %request_id,
        %filename,
        task = %task,
        chars = text.char_len(),
        truncated = bounded.was_truncated(),
        has_rubric = rubric.is_some(),
        "generating feedback"
    );

    let llm = state.llm_client();
    let response = run_prompt(
        llm.as_ref(),
        &settings.models.feedback_model,
        settings.generation.feedback,
        feedback_prompt(task, rubric.as_deref(), &task_label, bounded.as_str()),
    )
    .await?;

    let feedback = strip_markdown_emphasis(&response.text);
    let score = extract_score(&feedback);
    info!(%request_id, score, "feedback ready");

    Ok(Json(FeedbackResponse {
        score,
        feedback,
        task_type: task_label,
        filename,
    }))
}
