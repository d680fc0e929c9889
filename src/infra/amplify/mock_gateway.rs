use async_trait::async_trait;

use crate::core::ai::synthetic::synthetic_analysis_text;
use crate::core::ai::{
    AiError, AiGateway, AiMode, ChatRequest, ChatResponse, UploadOptions, UploadResult,
    UploadedFile,
};

const MOCK_KEY_PREFIX: &str = "mock-";

/// Offline stand-in used when no API key is configured. Never touches the network.
pub struct MockAiGateway;

#[async_trait]
impl AiGateway for MockAiGateway {
    async fn upload_file(
        &self,
        file: &UploadedFile,
        _options: &UploadOptions,
    ) -> Result<UploadResult, AiError> {
        tracing::debug!(file = %file.name, size = file.size(), "Mock upload");
        Ok(UploadResult {
            key: format!("{}{}", MOCK_KEY_PREFIX, file.name),
            upload_url: format!("mock://uploads/{}", file.name),
        })
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError> {
        let names: Vec<String> = request
            .data_sources
            .iter()
            .map(|key| key.strip_prefix(MOCK_KEY_PREFIX).unwrap_or(key).to_string())
            .collect();

        Ok(ChatResponse {
            success: true,
            content: synthetic_analysis_text(&names),
        })
    }

    fn mode(&self) -> AiMode {
        AiMode::Mock
    }
}
