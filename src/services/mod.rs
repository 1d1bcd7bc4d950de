// src/services/mod.rs
//
// Outbound integrations used by the auth module: provider OAuth2 calls,
// verification-code delivery and password hashing

pub mod email;
pub mod oauth;
pub mod password;

// Re-export commonly used types for convenience
pub use email::{LoggingNotifier, VerificationNotifier, WebhookNotifier};
pub use oauth::OAuthClient;
pub use password::{BcryptHasher, PasswordHasher};
