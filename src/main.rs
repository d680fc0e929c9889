// This is the entry point of the LMS integration server.
//
// **Architecture Overview:**
// - `core/` = Business logic (auth session, LMS/AI contracts, orchestration)
// - `infra/` = Implementations of core traits (Brightspace and Amplify clients)
// - `web/` = HTTP adapters (axum routes for the browser frontend)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Build the router and serve it

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "web/web_layer.rs"]
mod web;

mod config;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::core::ai::AiMode;
use crate::core::lms::LmsApi;
use crate::core::processing::{ProcessingService, RetryPolicy};
use crate::infra::amplify::build_ai_gateway;
use crate::infra::brightspace::{BrightspaceClient, OAuthTokenManager};
use crate::web::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let auth = Arc::new(
        OAuthTokenManager::new(config.oauth.clone()).context("Invalid OAuth configuration")?,
    );

    let lms: Arc<dyn LmsApi> = Arc::new(
        BrightspaceClient::new(
            Arc::clone(&auth),
            config.brightspace_base_url.clone(),
            config.lp_version.clone(),
            config.le_version.clone(),
        )
        .context("Failed to create Brightspace client")?,
    );

    // No API key means mock mode, which needs no waiting between calls
    let ai = build_ai_gateway(&config.amplify_api_url, config.amplify_api_key.as_deref())
        .context("Failed to create AI client")?;
    let ai_mode = ai.mode();
    let policy = match ai_mode {
        AiMode::Live => RetryPolicy::default(),
        AiMode::Mock => RetryPolicy::immediate(),
    };
    if ai_mode == AiMode::Mock {
        tracing::warn!("AMPLIFY_API_KEY not set, AI analysis runs in mock mode");
    }

    let processing = Arc::new(ProcessingService::new(
        Arc::clone(&lms),
        ai,
        config.ai.clone(),
        policy,
    ));

    let state = AppState {
        auth,
        lms,
        processing,
        ai_mode,
        started_at: Utc::now(),
    };
    let app = build_router(state, &config.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        %addr,
        lms = %config.brightspace_base_url,
        ai_mode = ?ai_mode,
        "Server listening"
    );
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
