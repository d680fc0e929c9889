// Domain types for the LMS OAuth2 session.
// Nothing in here talks HTTP; the token manager in `infra/brightspace` owns the
// network side and mutates `TokenState` through exchange/refresh only.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the authorization-code flow.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint refused the code or refresh token (expired, reused, bad credentials).
    #[error("token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    /// No token is held and there is nothing to refresh with.
    #[error("not authenticated with the LMS; start the authorization flow")]
    NotAuthenticated,
    /// The callback carried a `state` we never issued (or it already expired).
    #[error("unknown or expired OAuth state parameter")]
    InvalidState,
    #[error("invalid OAuth configuration: {0}")]
    Config(String),
    #[error("token request failed: {0}")]
    Transport(String),
}

/// Tokens currently held for the single LMS session.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    /// Builds a state from a token endpoint answer, `expires_in` counted from `now`.
    pub fn from_grant(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now + Duration::seconds(expires_in_secs.max(0)),
        }
    }

    /// True iff the access token is non-empty and has not expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && now < self.expires_at
    }
}

/// Static OAuth client settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// What the UI shows about the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub expires_at: Option<DateTime<Utc>>,
}
