// Shared fixtures for tests that need a live HTTP peer.

use std::sync::Arc;

use axum::Router;
use chrono::{Duration, Utc};

use crate::core::auth::{OAuthConfig, TokenState};
use crate::infra::brightspace::OAuthTokenManager;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn oauth_config(token_url: &str) -> OAuthConfig {
    OAuthConfig {
        client_id: "client-123".to_string(),
        client_secret: "secret-456".to_string(),
        auth_url: "https://auth.example.test/oauth2/auth".to_string(),
        token_url: token_url.to_string(),
        redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        scopes: vec!["core:*:*".to_string()],
    }
}

/// Token manager already holding a fresh access token `test-token`.
pub async fn authenticated_manager() -> Arc<OAuthTokenManager> {
    let manager = OAuthTokenManager::new(oauth_config("http://127.0.0.1:9/token")).unwrap();
    manager
        .seed_token(TokenState {
            access_token: "test-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        })
        .await;
    Arc::new(manager)
}
