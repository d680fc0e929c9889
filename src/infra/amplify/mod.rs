pub mod amplify_client;
pub mod mock_gateway;

use std::sync::Arc;

pub use amplify_client::AmplifyClient;
pub use mock_gateway::MockAiGateway;

use crate::core::ai::{AiError, AiGateway, AiMode};

/// Picks the gateway once; everything downstream only sees the trait object.
pub fn build_ai_gateway(
    api_url: &str,
    api_key: Option<&str>,
) -> Result<Arc<dyn AiGateway>, AiError> {
    match (AiMode::from_api_key(api_key), api_key) {
        (AiMode::Live, Some(key)) => Ok(Arc::new(AmplifyClient::new(api_url, key.trim())?)),
        _ => Ok(Arc::new(MockAiGateway)),
    }
}
