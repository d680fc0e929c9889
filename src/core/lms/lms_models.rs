use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::auth::AuthError;

/// Errors surfaced by the LMS gateway.
///
/// These never escape a request as panics: the web layer turns every variant
/// into a JSON envelope, and the orchestration layer records them per
/// sub-operation.
#[derive(Debug, Error)]
pub enum LmsError {
    #[error("not authenticated with the LMS; start the authorization flow")]
    NotAuthenticated,
    #[error("LMS authorization failed: {0}")]
    Auth(String),
    /// 401/403: usually the OAuth app has not been granted the scope yet.
    #[error("permission denied by the LMS ({status}): {body}")]
    PermissionDenied { status: u16, body: String },
    #[error("LMS resource not found: {0}")]
    NotFound(String),
    #[error("LMS returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("file upload failed during {stage}: {detail}")]
    Upload { stage: UploadStage, detail: String },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("LMS request failed: {0}")]
    Transport(String),
}

impl From<AuthError> for LmsError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotAuthenticated => LmsError::NotAuthenticated,
            other => LmsError::Auth(other.to_string()),
        }
    }
}

/// Which of the three upload calls failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Initiate,
    Transfer,
    Finalize,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStage::Initiate => "initiate",
            UploadStage::Transfer => "transfer",
            UploadStage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Maps a non-success status from the LMS onto the error taxonomy.
pub fn classify_status(status: u16, body: String, resource: &str) -> LmsError {
    match status {
        401 | 403 => LmsError::PermissionDenied { status, body },
        404 => LmsError::NotFound(resource.to_string()),
        _ => LmsError::Upstream { status, body },
    }
}

/// Rejects identifiers that are empty or would escape their path segment.
pub fn require_id<'a>(value: &'a str, what: &str) -> Result<&'a str, LmsError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LmsError::Validation(format!("{} is required", what)));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LmsError::Validation(format!(
            "{} contains unsupported characters",
            what
        )));
    }
    Ok(trimmed)
}

/// Read-only projection of an enrolled course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseRef {
    pub id: String,
    pub name: String,
    pub code: String,
}

/// Projects the `myenrollments` listing onto course offerings.
///
/// Org units that carry a type other than "Course Offering" (departments,
/// semesters, the organization itself) are skipped.
pub fn course_refs(enrollments: &Value) -> Vec<CourseRef> {
    let Some(items) = enrollments.get("Items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| item.get("OrgUnit"))
        .filter(|org_unit| {
            org_unit
                .pointer("/Type/Code")
                .and_then(Value::as_str)
                .map(|code| code.eq_ignore_ascii_case("Course Offering"))
                .unwrap_or(true)
        })
        .filter_map(|org_unit| {
            let id = match org_unit.get("Id")? {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return None,
            };
            Some(CourseRef {
                id,
                name: string_field(org_unit, "Name"),
                code: string_field(org_unit, "Code"),
            })
        })
        .collect()
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Outcome of the three-step LMS file upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LmsFileUpload {
    pub file_key: String,
    pub file_name: String,
    pub response: Value,
}

/// The fixed set of LMS operations this system needs.
///
/// Implementations must obtain a valid bearer token before every call and
/// must not retry on their own.
#[async_trait]
pub trait LmsApi: Send + Sync {
    async fn get_current_user(&self) -> Result<Value, LmsError>;
    async fn get_courses(&self) -> Result<Value, LmsError>;
    async fn get_course(&self, course_id: &str) -> Result<Value, LmsError>;
    async fn get_course_content(&self, course_id: &str) -> Result<Value, LmsError>;
    async fn create_announcement(&self, course_id: &str, data: Value) -> Result<Value, LmsError>;
    async fn create_discussion_forum(
        &self,
        course_id: &str,
        data: Value,
    ) -> Result<Value, LmsError>;
    async fn create_survey(&self, course_id: &str, data: Value) -> Result<Value, LmsError>;
    async fn create_content_module(
        &self,
        course_id: &str,
        data: Value,
    ) -> Result<Value, LmsError>;
    /// Adds a topic linking an uploaded course file to an existing module.
    async fn create_file_topic(
        &self,
        course_id: &str,
        module_id: &str,
        data: Value,
    ) -> Result<Value, LmsError>;
    async fn upload_file(
        &self,
        course_id: &str,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
    ) -> Result<LmsFileUpload, LmsError>;
}

// Shared handles are what the web layer holds, so let them stand in for the
// trait directly.
#[async_trait]
impl LmsApi for Arc<dyn LmsApi> {
    async fn get_current_user(&self) -> Result<Value, LmsError> {
        (**self).get_current_user().await
    }

    async fn get_courses(&self) -> Result<Value, LmsError> {
        (**self).get_courses().await
    }

    async fn get_course(&self, course_id: &str) -> Result<Value, LmsError> {
        (**self).get_course(course_id).await
    }

    async fn get_course_content(&self, course_id: &str) -> Result<Value, LmsError> {
        (**self).get_course_content(course_id).await
    }

    async fn create_announcement(&self, course_id: &str, data: Value) -> Result<Value, LmsError> {
        (**self).create_announcement(course_id, data).await
    }

    async fn create_discussion_forum(
        &self,
        course_id: &str,
        data: Value,
    ) -> Result<Value, LmsError> {
        (**self).create_discussion_forum(course_id, data).await
    }

    async fn create_survey(&self, course_id: &str, data: Value) -> Result<Value, LmsError> {
        (**self).create_survey(course_id, data).await
    }

    async fn create_content_module(
        &self,
        course_id: &str,
        data: Value,
    ) -> Result<Value, LmsError> {
        (**self).create_content_module(course_id, data).await
    }

    async fn create_file_topic(
        &self,
        course_id: &str,
        module_id: &str,
        data: Value,
    ) -> Result<Value, LmsError> {
        (**self).create_file_topic(course_id, module_id, data).await
    }

    async fn upload_file(
        &self,
        course_id: &str,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
    ) -> Result<LmsFileUpload, LmsError> {
        (**self).upload_file(course_id, bytes, name, mime_type).await
    }
}
