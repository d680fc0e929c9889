pub mod processing_service;
pub mod prompts;
pub mod response_parser;
pub mod retry;

pub use processing_service::{
    ProcessingError, ProcessingOptions, ProcessingOutcome, ProcessingService, PublishRequest,
    PublishResult,
};
pub use prompts::ProcessingType;
pub use retry::RetryPolicy;
