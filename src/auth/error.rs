//! Authentication error taxonomy

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad signature, malformed, wrong kind or expired. Never distinguished further.
    #[error("invalid token")]
    InvalidToken,

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("provider exchange failed: {0}")]
    ProviderExchange(String),

    #[error("provider denied authorization: {0}")]
    ProviderDenied(String),

    #[error("provider payload has no subject identifier")]
    MissingSubject,

    #[error("oauth2 state mismatch")]
    InvalidState,

    #[error("user not found")]
    UserNotFound,

    #[error("account locked")]
    AccountLocked,

    #[error("account inactive")]
    AccountInactive,

    #[error("email not verified")]
    EmailNotVerified,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email already registered to another identity")]
    EmailConflict,

    #[error("token issue failed: {0}")]
    TokenIssue(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuthError {
    /// Short reason safe to hand to the browser, e.g. in the OAuth2 failure redirect
    pub fn classification(&self) -> &'static str {
        match self {
            AuthError::InvalidToken => "invalid_token",
            AuthError::UnsupportedProvider(_) => "unsupported_provider",
            AuthError::ProviderNotConfigured(_) => "provider_not_configured",
            AuthError::ProviderExchange(_) => "provider_error",
            AuthError::ProviderDenied(_) => "access_denied",
            AuthError::MissingSubject => "invalid_provider_response",
            AuthError::InvalidState => "invalid_state",
            AuthError::UserNotFound => "user_not_found",
            AuthError::AccountLocked => "account_locked",
            AuthError::AccountInactive => "account_inactive",
            AuthError::EmailNotVerified => "email_not_verified",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::EmailConflict => "email_already_registered",
            AuthError::TokenIssue(_)
            | AuthError::PasswordHash(_)
            | AuthError::Database(_) => "oauth2_login_failed",
        }
    }

    /// Converts a unique-constraint violation into `EmailConflict`
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AuthError::EmailConflict
            }
            _ => AuthError::Database(err),
        }
    }
}
