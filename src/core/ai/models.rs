use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiMessage {
    pub role: String,
    pub content: String,
}

impl AiMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Generation settings applied to every analysis call.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.3,
            max_tokens: 4000,
        }
    }
}

/// Whether the AI vendor is reached over the network or simulated.
///
/// Chosen once at startup from the presence of an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AiMode {
    Live,
    Mock,
}

impl AiMode {
    pub fn from_api_key(api_key: Option<&str>) -> Self {
        match api_key.map(str::trim) {
            Some(key) if !key.is_empty() => AiMode::Live,
            _ => AiMode::Mock,
        }
    }
}

/// A file received from the browser, held in memory for one request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Vendor-side processing steps requested for an upload.
pub const DEFAULT_UPLOAD_ACTIONS: [&str; 5] = [
    "saveAsData",
    "createChunks",
    "ingestRag",
    "makeDownloadable",
    "updateMetadata",
];

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub knowledge_base: String,
    pub tags: Vec<String>,
    pub actions: Vec<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            knowledge_base: "default".to_string(),
            tags: Vec::new(),
            actions: DEFAULT_UPLOAD_ACTIONS
                .iter()
                .map(|a| a.to_string())
                .collect(),
        }
    }
}

/// Handle for an uploaded file; `key` is what later chat calls cite as a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub key: String,
    pub upload_url: String,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub data_sources: Vec<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(prompt: String, data_sources: Vec<String>, config: &AiConfig) -> Self {
        Self {
            prompt,
            data_sources,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// RAG is skipped when nothing is attached.
    pub fn skip_rag(&self) -> bool {
        self.data_sources.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub success: bool,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI upload failed during {stage}: {detail}")]
    Upload { stage: &'static str, detail: String },
    #[error("AI API returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("unexpected AI API response: {0}")]
    InvalidResponse(String),
    #[error("AI request failed: {0}")]
    Transport(String),
}
