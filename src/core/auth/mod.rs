pub mod auth_models;

pub use auth_models::{AuthError, AuthStatus, OAuthConfig, TokenState};
