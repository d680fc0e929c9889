// =============================================================================
// BRIGHTSPACE OAUTH2 TOKEN MANAGER
// =============================================================================
//
// Authorization-code grant against the Brightspace auth service:
//
// 1. `begin_authorization()` hands the browser an authorize URL carrying a
//    random `state` that we remember.
// 2. Brightspace redirects back with `code` + `state`; the callback checks the
//    state with `consume_state()` and calls `exchange_code()`.
// 3. Every LMS call goes through `ensure_valid_token()`, which refreshes the
//    access token when it is about to expire.
//
// The token lives behind a tokio Mutex that is held across the refresh call,
// so concurrent requests that find an expired token wait for a single refresh
// instead of each burning the (single-use) refresh token.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::core::auth::{AuthError, AuthStatus, OAuthConfig, TokenState};

/// Refresh this long before the real expiry so a token does not die mid-request.
const REFRESH_MARGIN_SECS: i64 = 30;

/// Assumed lifetime when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// How long an issued `state` stays acceptable at the callback.
const STATE_TTL_MINUTES: i64 = 10;

const STATE_LENGTH: usize = 32;

/// Logins in flight at once; past this the oldest `state` is dropped.
const MAX_PENDING_STATES: usize = 256;

const TOKEN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Brightspace may omit the refresh token on refresh; keep the previous one then.
    fn into_state(self, previous_refresh: Option<String>, now: DateTime<Utc>) -> TokenState {
        TokenState::from_grant(
            self.access_token,
            self.refresh_token.or(previous_refresh),
            self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            now,
        )
    }
}

pub struct OAuthTokenManager {
    config: OAuthConfig,
    client: Client,
    token: Mutex<Option<TokenState>>,
    pending_states: DashMap<String, DateTime<Utc>>,
}

impl OAuthTokenManager {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        Url::parse(&config.auth_url)
            .map_err(|e| AuthError::Config(format!("invalid auth URL: {}", e)))?;
        Url::parse(&config.token_url)
            .map_err(|e| AuthError::Config(format!("invalid token URL: {}", e)))?;

        let client = Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Config(e.to_string()))?;

        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
            pending_states: DashMap::new(),
        })
    }

    /// Builds the authorize URL. Pure: same inputs, same URL.
    pub fn build_authorization_url(&self, scopes: &[String], state: &str) -> Result<Url, AuthError> {
        let scope = scopes.join(" ");
        Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Config(format!("invalid auth URL: {}", e)))
    }

    /// Starts a login: issues a fresh `state` and the URL to send the browser to.
    pub fn begin_authorization(&self) -> Result<(Url, String), AuthError> {
        let now = Utc::now();
        self.pending_states
            .retain(|_, issued_at| now - *issued_at < Duration::minutes(STATE_TTL_MINUTES));
        while self.pending_states.len() >= MAX_PENDING_STATES {
            let oldest = self
                .pending_states
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.pending_states.remove(&key);
                }
                None => break,
            }
        }

        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LENGTH)
            .map(char::from)
            .collect();
        let url = self.build_authorization_url(&self.config.scopes, &state)?;
        self.pending_states.insert(state.clone(), now);

        Ok((url, state))
    }

    /// Accepts a callback `state` exactly once, and only if we issued it recently.
    pub fn consume_state(&self, state: &str) -> Result<(), AuthError> {
        match self.pending_states.remove(state) {
            Some((_, issued_at))
                if Utc::now() - issued_at < Duration::minutes(STATE_TTL_MINUTES) =>
            {
                Ok(())
            }
            _ => Err(AuthError::InvalidState),
        }
    }

    /// Trades an authorization code for tokens. Not retried: codes are single-use.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenState, AuthError> {
        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .await?;

        let state = response.into_state(None, Utc::now());
        *self.token.lock().await = Some(state.clone());
        tracing::info!(expires_at = %state.expires_at, "LMS authorization completed");

        Ok(state)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now()).await
    }

    pub async fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.token
            .lock()
            .await
            .as_ref()
            .is_some_and(|state| state.is_valid_at(now))
    }

    pub async fn status(&self) -> AuthStatus {
        let now = Utc::now();
        let guard = self.token.lock().await;
        match guard.as_ref() {
            Some(state) if state.is_valid_at(now) => AuthStatus {
                authenticated: true,
                expires_at: Some(state.expires_at),
            },
            _ => AuthStatus {
                authenticated: false,
                expires_at: None,
            },
        }
    }

    /// Returns an access token that is good for at least a few more seconds.
    ///
    /// Refreshes when needed; with nothing to refresh the caller has to send the
    /// user through the authorization flow again.
    pub async fn ensure_valid_token(&self) -> Result<String, AuthError> {
        let mut guard = self.token.lock().await;
        let now = Utc::now();

        let refresh_token = match guard.as_ref() {
            Some(state) if state.is_valid_at(now + Duration::seconds(REFRESH_MARGIN_SECS)) => {
                return Ok(state.access_token.clone());
            }
            // Inside the margin but nothing to refresh with: use it while it lasts.
            Some(state) if state.refresh_token.is_none() && state.is_valid_at(now) => {
                return Ok(state.access_token.clone());
            }
            Some(state) => state.refresh_token.clone(),
            None => None,
        };

        let Some(refresh_token) = refresh_token else {
            return Err(AuthError::NotAuthenticated);
        };

        tracing::info!("Refreshing LMS access token");
        let result = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .await;

        match result {
            Ok(response) => {
                let state = response.into_state(Some(refresh_token), Utc::now());
                let access_token = state.access_token.clone();
                *guard = Some(state);
                Ok(access_token)
            }
            Err(err @ AuthError::Rejected { .. }) => {
                tracing::warn!(error = %err, "Refresh token rejected, clearing LMS session");
                *guard = None;
                Err(err)
            }
            Err(err) => match guard.as_ref() {
                // Early refresh failed but the current token has not expired yet
                Some(state) if state.is_valid_at(Utc::now()) => {
                    tracing::warn!(error = %err, "Token refresh failed, using current token until it expires");
                    Ok(state.access_token.clone())
                }
                _ => Err(err),
            },
        }
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected { status, body });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Transport(format!("invalid token response: {}", e)))
    }

    #[cfg(test)]
    pub(crate) async fn seed_token(&self, state: TokenState) {
        *self.token.lock().await = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{oauth_config, spawn_stub};
    use axum::{http::StatusCode, routing::post, Form, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Token endpoint that accepts code "good" (and "short", which expires at once)
    /// and refresh token "r1".
    async fn token_stub(refreshes: Arc<AtomicUsize>) -> String {
        let router = Router::new().route(
            "/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let refreshes = Arc::clone(&refreshes);
                async move {
                    let grant = form.get("grant_type").map(String::as_str);
                    let code = form.get("code").map(String::as_str);
                    match (grant, code) {
                        (Some("authorization_code"), Some("good")) => (
                            StatusCode::OK,
                            Json(json!({ "access_token": "a1", "refresh_token": "r1",
                                         "expires_in": 3600, "token_type": "Bearer" })),
                        ),
                        (Some("authorization_code"), Some("short")) => (
                            StatusCode::OK,
                            Json(json!({ "access_token": "a0", "expires_in": 0 })),
                        ),
                        (Some("refresh_token"), _)
                            if form.get("refresh_token").map(String::as_str) == Some("r1") =>
                        {
                            refreshes.fetch_add(1, Ordering::SeqCst);
                            // Slow enough that concurrent callers pile up on the lock
                            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                            (
                                StatusCode::OK,
                                Json(json!({ "access_token": "a2", "expires_in": 3600 })),
                            )
                        }
                        _ => (
                            StatusCode::BAD_REQUEST,
                            Json(json!({ "error": "invalid_grant" })),
                        ),
                    }
                }
            }),
        );
        spawn_stub(router).await
    }

    fn expired(refresh_token: Option<&str>) -> TokenState {
        TokenState {
            access_token: "stale".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Utc::now() - Duration::seconds(5),
        }
    }

    fn expiring_soon(refresh_token: &str) -> TokenState {
        TokenState {
            access_token: "still-good".to_string(),
            refresh_token: Some(refresh_token.to_string()),
            expires_at: Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS - 10),
        }
    }

    #[test]
    fn test_authorization_url_round_trips_state() {
        let manager = OAuthTokenManager::new(oauth_config("http://127.0.0.1:9/token")).unwrap();
        let scopes = vec!["core:*:*".to_string(), "news:*:*".to_string()];
        let state = "xY9 &odd=state";

        let url = manager.build_authorization_url(&scopes, state).unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(query["state"], state);
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-123");
        assert_eq!(query["scope"], "core:*:* news:*:*");
        assert_eq!(query["redirect_uri"], "http://localhost:3000/auth/callback");
        assert_eq!(url.path(), "/oauth2/auth");
    }

    #[test]
    fn test_issued_state_is_random_and_single_use() {
        let manager = OAuthTokenManager::new(oauth_config("http://127.0.0.1:9/token")).unwrap();

        let (url, state) = manager.begin_authorization().unwrap();
        let (_, other) = manager.begin_authorization().unwrap();

        assert_eq!(state.len(), STATE_LENGTH);
        assert_ne!(state, other);
        assert!(url.query_pairs().any(|(k, v)| k == "state" && v == state));

        assert!(manager.consume_state(&state).is_ok());
        assert!(matches!(
            manager.consume_state(&state),
            Err(AuthError::InvalidState)
        ));
        assert!(matches!(
            manager.consume_state("never-issued"),
            Err(AuthError::InvalidState)
        ));
    }

    #[test]
    fn test_pending_states_are_capped() {
        let manager = OAuthTokenManager::new(oauth_config("http://127.0.0.1:9/token")).unwrap();
        let now = Utc::now();
        for i in 0..MAX_PENDING_STATES - 1 {
            manager
                .pending_states
                .insert(format!("s{}", i), now - Duration::minutes(1));
        }
        manager
            .pending_states
            .insert("oldest".to_string(), now - Duration::minutes(5));

        let (_, state) = manager.begin_authorization().unwrap();

        assert_eq!(manager.pending_states.len(), MAX_PENDING_STATES);
        assert!(matches!(
            manager.consume_state("oldest"),
            Err(AuthError::InvalidState)
        ));
        assert!(manager.consume_state(&state).is_ok());
    }

    #[test]
    fn test_invalid_auth_url_is_rejected() {
        let mut config = oauth_config("http://127.0.0.1:9/token");
        config.auth_url = "not a url".to_string();
        assert!(matches!(
            OAuthTokenManager::new(config),
            Err(AuthError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_authenticates() {
        let base = token_stub(Arc::new(AtomicUsize::new(0))).await;
        let manager = OAuthTokenManager::new(oauth_config(&format!("{}/token", base))).unwrap();

        assert!(!manager.is_authenticated().await);

        let state = manager.exchange_code("good").await.unwrap();
        assert_eq!(state.access_token, "a1");
        assert!(manager.is_authenticated().await);
        assert!(manager.status().await.authenticated);

        // Once the clock reaches expires_at the session is no longer valid
        assert!(!manager.is_authenticated_at(state.expires_at).await);
        assert_eq!(manager.ensure_valid_token().await.unwrap(), "a1");
    }

    #[tokio::test]
    async fn test_token_expiring_immediately_is_not_authenticated() {
        let base = token_stub(Arc::new(AtomicUsize::new(0))).await;
        let manager = OAuthTokenManager::new(oauth_config(&format!("{}/token", base))).unwrap();

        manager.exchange_code("short").await.unwrap();

        assert!(!manager.is_authenticated().await);
        assert!(matches!(
            manager.ensure_valid_token().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_rejected_code_is_not_retried() {
        let base = token_stub(Arc::new(AtomicUsize::new(0))).await;
        let manager = OAuthTokenManager::new(oauth_config(&format!("{}/token", base))).unwrap();

        let err = manager.exchange_code("expired-code").await.unwrap_err();

        assert!(matches!(err, AuthError::Rejected { status: 400, .. }));
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_no_token_requires_authorization() {
        let manager = OAuthTokenManager::new(oauth_config("http://127.0.0.1:9/token")).unwrap();
        assert!(matches!(
            manager.ensure_valid_token().await,
            Err(AuthError::NotAuthenticated)
        ));

        manager.seed_token(expired(None)).await;
        assert!(matches!(
            manager.ensure_valid_token().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let base = token_stub(Arc::clone(&refreshes)).await;
        let manager = Arc::new(
            OAuthTokenManager::new(oauth_config(&format!("{}/token", base))).unwrap(),
        );
        manager.seed_token(expired(Some("r1"))).await;

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.ensure_valid_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "a2");
        }
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert!(manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed_once() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let base = token_stub(Arc::clone(&refreshes)).await;
        let manager = OAuthTokenManager::new(oauth_config(&format!("{}/token", base))).unwrap();
        manager.seed_token(expiring_soon("r1")).await;

        assert_eq!(manager.ensure_valid_token().await.unwrap(), "a2");
        assert_eq!(manager.ensure_valid_token().await.unwrap(), "a2");
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_keeps_unexpired_token() {
        // Nothing listens on port 9
        let manager = OAuthTokenManager::new(oauth_config("http://127.0.0.1:9/token")).unwrap();
        manager.seed_token(expiring_soon("r1")).await;

        assert_eq!(manager.ensure_valid_token().await.unwrap(), "still-good");
        assert!(manager.is_authenticated().await);

        // Once it has expired there is nothing left to fall back on
        manager.seed_token(expired(Some("r1"))).await;
        assert!(matches!(
            manager.ensure_valid_token().await,
            Err(AuthError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let base = token_stub(Arc::new(AtomicUsize::new(0))).await;
        let manager = OAuthTokenManager::new(oauth_config(&format!("{}/token", base))).unwrap();
        manager.seed_token(expired(Some("revoked"))).await;

        assert!(matches!(
            manager.ensure_valid_token().await,
            Err(AuthError::Rejected { .. })
        ));
        // Nothing left to refresh with
        assert!(matches!(
            manager.ensure_valid_token().await,
            Err(AuthError::NotAuthenticated)
        ));
    }
}
