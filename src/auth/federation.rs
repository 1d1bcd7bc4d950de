//! Provider identity federation
//!
//! Maps a provider's raw user-info payload onto a canonical identity and
//! reconciles it against the `users` table with one atomic upsert keyed on
//! (provider, provider_id).
//!
//! Payload shapes are selected by provider tag into a closed set of
//! attribute variants, never by inspecting the payload itself.

use serde_json::Value;
use std::collections::HashMap;
use std::env;
use tracing::{debug, info, warn};

use super::models::{Identity, Provider};
use super::repository::UserRepository;
use super::email::normalize_email;
use super::AuthError;
use crate::common::safe_email_log;

/// Dotted paths to the four fields we read from a user-info payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub avatar: String,
}

impl AttributeMapping {
    /// OpenID Connect standard claims
    pub fn google() -> Self {
        Self {
            subject: "sub".to_string(),
            email: "email".to_string(),
            name: "name".to_string(),
            avatar: "picture".to_string(),
        }
    }

    /// Kakao `/v2/user/me`
    pub fn kakao() -> Self {
        Self {
            subject: "id".to_string(),
            email: "kakao_account.email".to_string(),
            name: "kakao_account.profile.nickname".to_string(),
            avatar: "kakao_account.profile.profile_image_url".to_string(),
        }
    }

    /// `OAUTH2_<PREFIX>_{SUBJECT,EMAIL,NAME,AVATAR}_FIELD`
    pub fn apply_env_overrides(&mut self, prefix: &str) {
        let fields = [
            ("SUBJECT", &mut self.subject),
            ("EMAIL", &mut self.email),
            ("NAME", &mut self.name),
            ("AVATAR", &mut self.avatar),
        ];
        for (field, slot) in fields {
            if let Ok(path) = env::var(format!("OAUTH2_{}_{}_FIELD", prefix, field)) {
                if !path.trim().is_empty() {
                    *slot = path.trim().to_string();
                }
            }
        }
    }
}

/// Walks a dotted path through nested objects
fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(raw, |node, segment| node.get(segment))
}

/// Strings pass through, numbers are stringified, blanks count as absent
fn lookup_string(raw: &Value, path: &str) -> Option<String> {
    match lookup(raw, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fields extracted from one provider payload, before any defaulting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedIdentity {
    pub provider_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

pub struct GoogleAttributes<'a> {
    raw: &'a Value,
    mapping: &'a AttributeMapping,
}

impl GoogleAttributes<'_> {
    fn extract_identity(&self) -> Result<ExtractedIdentity, AuthError> {
        let provider_id =
            lookup_string(self.raw, &self.mapping.subject).ok_or(AuthError::MissingSubject)?;

        // An address Google itself marks unverified is not trusted
        let email = lookup_string(self.raw, &self.mapping.email).filter(|_| {
            !matches!(self.raw.get("email_verified"), Some(Value::Bool(false)))
        });

        Ok(ExtractedIdentity {
            provider_id,
            email,
            name: lookup_string(self.raw, &self.mapping.name),
            avatar: lookup_string(self.raw, &self.mapping.avatar),
        })
    }
}

pub struct KakaoAttributes<'a> {
    raw: &'a Value,
    mapping: &'a AttributeMapping,
}

impl KakaoAttributes<'_> {
    fn extract_identity(&self) -> Result<ExtractedIdentity, AuthError> {
        let provider_id =
            lookup_string(self.raw, &self.mapping.subject).ok_or(AuthError::MissingSubject)?;

        // Kakao withholds the address unless the user consented; when it does
        // send one, `is_email_valid`/`is_email_verified` may still disqualify it
        let account = self.raw.get("kakao_account");
        let flagged_false = |flag: &str| {
            matches!(
                account.and_then(|a| a.get(flag)),
                Some(Value::Bool(false))
            )
        };
        let email = lookup_string(self.raw, &self.mapping.email)
            .filter(|_| !flagged_false("is_email_valid") && !flagged_false("is_email_verified"));

        Ok(ExtractedIdentity {
            provider_id,
            email,
            name: lookup_string(self.raw, &self.mapping.name),
            avatar: lookup_string(self.raw, &self.mapping.avatar),
        })
    }
}

/// Closed set of supported payload shapes
pub enum ProviderAttributes<'a> {
    Google(GoogleAttributes<'a>),
    Kakao(KakaoAttributes<'a>),
}

impl<'a> ProviderAttributes<'a> {
    pub fn select(
        provider: Provider,
        raw: &'a Value,
        mapping: &'a AttributeMapping,
    ) -> Result<Self, AuthError> {
        match provider {
            Provider::Google => Ok(ProviderAttributes::Google(GoogleAttributes { raw, mapping })),
            Provider::Kakao => Ok(ProviderAttributes::Kakao(KakaoAttributes { raw, mapping })),
            Provider::Local => Err(AuthError::UnsupportedProvider(provider.to_string())),
        }
    }

    pub fn extract_identity(&self) -> Result<ExtractedIdentity, AuthError> {
        match self {
            ProviderAttributes::Google(attrs) => attrs.extract_identity(),
            ProviderAttributes::Kakao(attrs) => attrs.extract_identity(),
        }
    }
}

/// Deterministic stand-in address for providers that withhold the email.
/// Never used as a contact address.
pub fn placeholder_email(provider: Provider, provider_id: &str) -> String {
    format!("{}@{}.local", provider_id, provider.registration_id())
}

/// Identity ready to be upserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalIdentity {
    pub provider: Provider,
    pub provider_id: String,
    pub email: String,
    pub email_is_placeholder: bool,
    /// `None` keeps the stored nickname on update
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

impl CanonicalIdentity {
    pub fn from_extracted(provider: Provider, extracted: ExtractedIdentity) -> Self {
        let nickname = extracted.name.or_else(|| {
            extracted
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        });

        let (email, email_is_placeholder) = match extracted.email {
            Some(email) => (normalize_email(&email), false),
            None => (placeholder_email(provider, &extracted.provider_id), true),
        };

        Self {
            provider,
            provider_id: extracted.provider_id,
            email,
            email_is_placeholder,
            nickname,
            avatar: extracted.avatar,
        }
    }

    pub fn placeholder(&self) -> String {
        placeholder_email(self.provider, &self.provider_id)
    }
}

#[derive(Clone)]
pub struct IdentityFederator {
    users: UserRepository,
    mappings: HashMap<Provider, AttributeMapping>,
}

impl IdentityFederator {
    pub fn new(users: UserRepository, mappings: HashMap<Provider, AttributeMapping>) -> Self {
        Self { users, mappings }
    }

    /// Reconciles a provider callback into exactly one stored identity.
    /// Idempotent: the same provider id always lands on the same row.
    pub async fn reconcile(
        &self,
        registration_id: &str,
        raw: &Value,
    ) -> Result<Identity, AuthError> {
        let provider = Provider::from_registration_id(registration_id)?;
        let mapping = self.mappings.get(&provider).ok_or_else(|| {
            warn!(provider = %provider, "No attribute mapping for provider");
            AuthError::UnsupportedProvider(registration_id.to_string())
        })?;

        let extracted = ProviderAttributes::select(provider, raw, mapping)?.extract_identity()?;
        let canonical = CanonicalIdentity::from_extracted(provider, extracted);

        debug!(
            provider = %provider,
            provider_id = %canonical.provider_id,
            email = %safe_email_log(&canonical.email),
            placeholder_email = canonical.email_is_placeholder,
            "Reconciling federated identity"
        );

        let identity = self.users.upsert_federated(&canonical).await?;

        info!(
            user_id = %identity.id,
            provider = %provider,
            provider_id = %identity.provider_id,
            "Federated identity reconciled"
        );
        Ok(identity)
    }
}
