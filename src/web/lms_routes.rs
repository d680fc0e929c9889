use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::api_response::{ok, ApiError, ApiResult};
use super::app_state::AppState;
use super::uploads::read_file;
use crate::core::lms::{course_refs, CourseRef, LmsFileUpload};

/// GET /api/user
pub async fn current_user(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ok(state.lms.get_current_user().await?))
}

/// GET /api/courses
pub async fn courses(State(state): State<AppState>) -> ApiResult<Vec<CourseRef>> {
    let enrollments = state.lms.get_courses().await?;
    Ok(ok(course_refs(&enrollments)))
}

/// GET /api/courses/:id
pub async fn course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Value> {
    Ok(ok(state.lms.get_course(&course_id).await?))
}

/// GET /api/courses/:id/content
pub async fn course_content(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Value> {
    Ok(ok(state.lms.get_course_content(&course_id).await?))
}

/// Body of the create-* endpoints: the target course plus the raw LMS object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    course_id: String,
    #[serde(default)]
    data: Value,
}

/// POST /api/create-announcement
pub async fn create_announcement(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = body?;
    Ok(ok(state
        .lms
        .create_announcement(&request.course_id, request.data)
        .await?))
}

/// POST /api/create-discussion
pub async fn create_discussion(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = body?;
    Ok(ok(state
        .lms
        .create_discussion_forum(&request.course_id, request.data)
        .await?))
}

/// POST /api/create-survey
pub async fn create_survey(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = body?;
    Ok(ok(state
        .lms
        .create_survey(&request.course_id, request.data)
        .await?))
}

/// POST /api/upload-file-to-brightspace (multipart: `courseId`, `file`)
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<LmsFileUpload> {
    let mut course_id = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "courseId" => course_id = Some(field.text().await?),
            "file" => file = Some(read_file(field).await?),
            _ => {}
        }
    }

    let course_id =
        course_id.ok_or_else(|| ApiError::BadRequest("courseId is required".to_string()))?;
    let file = file.ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;

    let uploaded = state
        .lms
        .upload_file(&course_id, &file.bytes, &file.name, &file.mime_type)
        .await?;
    Ok(ok(uploaded))
}
