use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;

use super::api_response::{ok, ApiError, ApiResult};
use super::app_state::AppState;
use super::uploads::{read_file, MAX_FILES_PER_REQUEST};
use crate::core::processing::{
    ProcessingOptions, ProcessingOutcome, ProcessingType, PublishRequest, PublishResult,
};

/// POST /api/process-files
///
/// Multipart: `files` (repeated), optional `processingType` and `instructions`.
pub async fn process_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<ProcessingOutcome> {
    let mut files = Vec::new();
    let mut options = ProcessingOptions::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" | "file" => {
                if files.len() == MAX_FILES_PER_REQUEST {
                    return Err(ApiError::BadRequest(format!(
                        "at most {} files per request",
                        MAX_FILES_PER_REQUEST
                    )));
                }
                files.push(read_file(field).await?);
            }
            "processingType" => {
                options.processing_type = field
                    .text()
                    .await?
                    .parse::<ProcessingType>()
                    .map_err(ApiError::BadRequest)?;
            }
            "instructions" => {
                let text = field.text().await?;
                options.instructions = Some(text).filter(|t| !t.trim().is_empty());
            }
            other => tracing::debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    tracing::info!(
        files = files.len(),
        processing_type = ?options.processing_type,
        "Processing request received"
    );
    let outcome = state.processing.process_files(files, &options).await?;
    Ok(ok(outcome))
}

/// POST /api/publish-to-brightspace
pub async fn publish(
    State(state): State<AppState>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult<PublishResult> {
    let Json(request) = body?;
    Ok(ok(state.processing.publish(request).await?))
}
