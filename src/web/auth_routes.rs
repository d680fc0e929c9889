use axum::extract::{Query, State};
use axum::response::Redirect;
use serde::{Deserialize, Serialize};

use super::api_response::{ok, ApiResult};
use super::app_state::AppState;
use crate::core::auth::AuthStatus;

#[derive(Debug, Serialize)]
pub struct AuthUrlResponse {
    pub url: String,
    pub state: String,
}

/// GET /api/auth-url
pub async fn auth_url(State(state): State<AppState>) -> ApiResult<AuthUrlResponse> {
    let (url, oauth_state) = state.auth.begin_authorization()?;
    Ok(ok(AuthUrlResponse {
        url: url.to_string(),
        state: oauth_state,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /auth/callback
///
/// Always ends in a browser redirect back to the app; the outcome rides on the query string.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    if let Some(error) = params.error.as_deref() {
        tracing::warn!(error = %error, "Authorization denied at the LMS");
        return error_redirect(&slug(error));
    }

    let Some(oauth_state) = params.state.as_deref() else {
        return error_redirect("missing_state");
    };
    if state.auth.consume_state(oauth_state).is_err() {
        tracing::warn!("OAuth callback carried an unknown state");
        return error_redirect("invalid_state");
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return error_redirect("missing_code");
    };

    match state.auth.exchange_code(code).await {
        Ok(_) => Redirect::to("/?auth=success"),
        Err(err) => {
            tracing::warn!(error = %err, "Authorization code exchange failed");
            error_redirect("token_exchange_failed")
        }
    }
}

/// GET /api/auth-status
pub async fn auth_status(State(state): State<AppState>) -> ApiResult<AuthStatus> {
    Ok(ok(state.auth.status().await))
}

fn error_redirect(reason: &str) -> Redirect {
    Redirect::to(&format!("/?auth=error&reason={}", reason))
}

/// Provider error codes are echoed into a URL; keep only safe characters.
fn slug(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "authorization_failed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_strips_unsafe_characters() {
        assert_eq!(slug("access_denied"), "access_denied");
        assert_eq!(slug("bad&reason=<x>"), "badreasonx");
        assert_eq!(slug("&&&"), "authorization_failed");
    }
}
