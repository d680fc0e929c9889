pub mod brightspace_client;
pub mod multipart;
pub mod oauth_client;

pub use brightspace_client::BrightspaceClient;
pub use oauth_client::OAuthTokenManager;
