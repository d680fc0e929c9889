// Web layer - the HTTP surface the browser frontend talks to.
// Handlers stay thin: extract, call core through the traits, wrap the answer.

pub mod api_response;
pub mod app_state;
pub mod auth_routes;
pub mod lms_routes;
pub mod processing_routes;
pub mod router;
pub mod uploads;

pub use app_state::AppState;
pub use router::build_router;
