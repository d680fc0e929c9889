use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::core::auth::AuthError;
use crate::core::lms::LmsError;
use crate::core::processing::ProcessingError;

/// Every JSON answer from the API: `{success, data}` or `{success, error}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

impl From<LmsError> for ApiError {
    fn from(err: LmsError) -> Self {
        let message = err.to_string();
        match err {
            LmsError::NotAuthenticated | LmsError::Auth(_) => ApiError::Unauthorized(message),
            LmsError::PermissionDenied { .. } => ApiError::Forbidden(format!(
                "{}. Check that the OAuth app has been granted the required scopes.",
                message
            )),
            LmsError::NotFound(_) => ApiError::NotFound(message),
            LmsError::Validation(_) => ApiError::BadRequest(message),
            LmsError::Upstream { .. } | LmsError::Upload { .. } | LmsError::Transport(_) => {
                ApiError::BadGateway(message)
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::NotAuthenticated | AuthError::Rejected { .. } => {
                ApiError::Unauthorized(message)
            }
            AuthError::InvalidState => ApiError::BadRequest(message),
            AuthError::Transport(_) => ApiError::BadGateway(message),
            AuthError::Config(_) => ApiError::Internal(message),
        }
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        let message = err.to_string();
        match err {
            ProcessingError::Validation(_) => ApiError::BadRequest(message),
            ProcessingError::NoFilesUploaded { .. } => ApiError::BadGateway(message),
            ProcessingError::ProcessingIncomplete { .. } => ApiError::Internal(message),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("invalid multipart body: {}", err.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lms_errors_map_to_statuses() {
        let cases = [
            (LmsError::NotAuthenticated, StatusCode::UNAUTHORIZED),
            (
                LmsError::PermissionDenied {
                    status: 403,
                    body: String::new(),
                },
                StatusCode::FORBIDDEN,
            ),
            (LmsError::NotFound("course 1".to_string()), StatusCode::NOT_FOUND),
            (LmsError::Validation("x".to_string()), StatusCode::BAD_REQUEST),
            (
                LmsError::Upstream {
                    status: 500,
                    body: String::new(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_processing_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(ProcessingError::Validation("no files".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ProcessingError::NoFilesUploaded {
                failures: vec!["a.pdf: refused".to_string()]
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
