mod auth;

pub use auth::CredentialError;
pub use auth::TokenManager;
