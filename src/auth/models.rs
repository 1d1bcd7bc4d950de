//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use super::AuthError;

/// Identity source. (provider, provider_id) is the federation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Provider {
    Local,
    Google,
    Kakao,
}

impl Provider {
    /// Lowercase registration id used in OAuth2 routes and placeholder emails
    pub fn registration_id(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Google => "google",
            Provider::Kakao => "kakao",
        }
    }

    pub fn env_prefix(&self) -> &'static str {
        match self {
            Provider::Local => "LOCAL",
            Provider::Google => "GOOGLE",
            Provider::Kakao => "KAKAO",
        }
    }

    /// Resolves an OAuth2 registration id. LOCAL is not an OAuth2 provider,
    /// and there is no default: anything unrecognized fails closed.
    pub fn from_registration_id(registration_id: &str) -> Result<Self, AuthError> {
        match registration_id.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "kakao" => Ok(Provider::Kakao),
            _ => Err(AuthError::UnsupportedProvider(registration_id.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.registration_id())
    }
}

/// Single role claim per identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Role {
    /// Unprivileged tier assigned at creation
    #[default]
    User,
    Nurse,
    Doctor,
    Admin,
}

/// Canonical identity record
#[derive(FromRow, Serialize, Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub nickname: String,
    pub profile_image_url: Option<String>,
    pub provider: Provider,
    pub provider_id: String,
    pub role: Role,
    pub is_active: bool,
    pub is_locked: bool,
    pub email_verified: bool,
    pub last_login_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Identity {
    /// LOCAL identities need a verified email and a password before login
    pub fn is_signup_complete(&self) -> bool {
        self.email_verified && self.password_hash.is_some()
    }
}

/// Which use a token is minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Provider id of the identity, not the internal id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub kind: TokenKind,
}

/// One-time code row backing the local signup path
#[derive(FromRow, Debug, Clone)]
pub struct EmailVerification {
    pub id: String,
    pub email: String,
    pub verification_code: String,
    pub expires_at: i64,
    pub is_verified: bool,
    pub user_id: String,
    pub created_at: Option<String>,
}

/// Public view of an identity returned by `/api/users/me` and email login
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub nickname: String,
    pub profile_image_url: Option<String>,
    pub provider: Provider,
    pub role: Role,
}

impl From<&Identity> for UserResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            nickname: identity.nickname.clone(),
            profile_image_url: identity.profile_image_url.clone(),
            provider: identity.provider,
            role: identity.role,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Deserialize, Debug)]
pub struct VerifyCodeQuery {
    pub email: String,
    pub code: String,
}

/// Body of `POST /auth/email/signup` and `POST /auth/email/login`.
/// Carries a plaintext password, so it has no Debug impl.
#[derive(Deserialize)]
pub struct EmailCredentials {
    pub email: String,
    pub password: String,
}

/// Query parameters the provider appends to the OAuth2 callback
#[derive(Deserialize, Debug, Default)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}
