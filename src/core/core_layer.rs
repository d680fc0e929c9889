// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "auth/mod.rs"]
pub mod auth;

#[path = "lms/mod.rs"]
pub mod lms;

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "processing/mod.rs"]
pub mod processing;
