use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::ai::{AiGateway, AiMode};
use crate::core::lms::LmsApi;
use crate::core::processing::ProcessingService;
use crate::infra::brightspace::OAuthTokenManager;

pub type SharedProcessing = ProcessingService<Arc<dyn LmsApi>, Arc<dyn AiGateway>>;

/// Everything a handler may touch. Cloned per request, so only handles live here.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<OAuthTokenManager>,
    pub lms: Arc<dyn LmsApi>,
    pub processing: Arc<SharedProcessing>,
    pub ai_mode: AiMode,
    pub started_at: DateTime<Utc>,
}
