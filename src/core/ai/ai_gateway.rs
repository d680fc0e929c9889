use super::models::{AiMode, ChatRequest, ChatResponse, UploadOptions, UploadResult, UploadedFile};
use super::AiError;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait AiGateway: Send + Sync {
    /// Uploads one file for analysis (descriptor POST, then PUT to the pre-signed URL).
    ///
    /// Either step failing is an `AiError::Upload`; nothing is retried here,
    /// the caller decides whether the file is worth another attempt.
    async fn upload_file(
        &self,
        file: &UploadedFile,
        options: &UploadOptions,
    ) -> Result<UploadResult, AiError>;

    /// Runs a single chat-style prompt, optionally over uploaded data sources.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError>;

    fn mode(&self) -> AiMode;
}

// Blanket implementation for Arc<dyn AiGateway>
// The mode is picked once at startup, so the rest of the app only ever sees
// the shared trait object.
#[async_trait]
impl AiGateway for Arc<dyn AiGateway> {
    async fn upload_file(
        &self,
        file: &UploadedFile,
        options: &UploadOptions,
    ) -> Result<UploadResult, AiError> {
        (**self).upload_file(file, options).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError> {
        (**self).chat(request).await
    }

    fn mode(&self) -> AiMode {
        (**self).mode()
    }
}
