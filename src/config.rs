// Runtime configuration, read once at startup.
// `from_source` takes any lookup so tests never touch the process environment.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::ai::AiConfig;
use crate::core::auth::OAuthConfig;

const DEFAULT_AUTH_URL: &str = "https://auth.brightspace.com/oauth2/auth";
const DEFAULT_TOKEN_URL: &str = "https://auth.brightspace.com/core/connect/token";
const DEFAULT_LP_VERSION: &str = "1.43";
const DEFAULT_LE_VERSION: &str = "1.74";
const DEFAULT_AMPLIFY_URL: &str = "https://prod-api.vanderbilt.ai";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STATIC_DIR: &str = "public";
const DEFAULT_SCOPES: &str = "core:*:* content:*:* enrollment:orgunit:read news:*:* \
discussions:*:* surveys:*:* managefiles:*:* users:profile:read";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub oauth: OAuthConfig,
    pub brightspace_base_url: String,
    pub lp_version: String,
    pub le_version: String,
    pub amplify_api_url: String,
    /// `None` switches the AI gateway to mock mode.
    pub amplify_api_key: Option<String>,
    pub ai: AiConfig,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let base_url = require("BRIGHTSPACE_BASE_URL")?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "BRIGHTSPACE_BASE_URL",
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let scopes = get("BRIGHTSPACE_SCOPES")
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let oauth = OAuthConfig {
            client_id: require("BRIGHTSPACE_CLIENT_ID")?,
            client_secret: require("BRIGHTSPACE_CLIENT_SECRET")?,
            auth_url: get("BRIGHTSPACE_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            token_url: get("BRIGHTSPACE_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            redirect_uri: get("BRIGHTSPACE_REDIRECT_URI")
                .unwrap_or_else(|| format!("http://localhost:{}/auth/callback", port)),
            scopes,
        };

        let mut ai = AiConfig::default();
        if let Some(model) = get("AMPLIFY_MODEL") {
            ai.model = model;
        }

        Ok(Self {
            oauth,
            brightspace_base_url: base_url.trim_end_matches('/').to_string(),
            lp_version: get("BRIGHTSPACE_LP_VERSION")
                .unwrap_or_else(|| DEFAULT_LP_VERSION.to_string()),
            le_version: get("BRIGHTSPACE_LE_VERSION")
                .unwrap_or_else(|| DEFAULT_LE_VERSION.to_string()),
            amplify_api_url: get("AMPLIFY_API_URL")
                .unwrap_or_else(|| DEFAULT_AMPLIFY_URL.to_string()),
            amplify_api_key: get("AMPLIFY_API_KEY"),
            ai,
            port,
            static_dir: PathBuf::from(
                get("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
            ),
        })
    }
}
