pub mod ai_gateway;
pub mod models;
pub mod synthetic;

pub use ai_gateway::AiGateway;
pub use models::{
    AiConfig, AiError, AiMessage, AiMode, ChatRequest, ChatResponse, UploadOptions,
    UploadResult, UploadedFile,
};
