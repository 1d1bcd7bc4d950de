// src/common/config.rs
//! Process-wide configuration, loaded once at startup and never mutated.
//!
//! Covers the signing key and token lifetimes, the cookie security posture,
//! the OAuth2 redirect targets and the per-provider registrations and
//! attribute mappings.

use std::collections::HashMap;
use std::env;
use tracing::{info, warn};

use crate::auth::federation::AttributeMapping;
use crate::auth::models::Provider;
use crate::services::oauth::ProviderRegistration;

const DEV_JWT_SECRET: &str = "replace_with_strong_secret";

/// SameSite attribute applied to every auth cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSitePolicy {
    Lax,
    Strict,
    None,
}

impl SameSitePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lax" => Some(SameSitePolicy::Lax),
            "strict" => Some(SameSitePolicy::Strict),
            "none" => Some(SameSitePolicy::None),
            _ => None,
        }
    }
}

/// Signing key and token lifetimes
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: DEV_JWT_SECRET.to_string(),
            access_ttl_secs: 30 * 60,
            refresh_ttl_secs: 14 * 24 * 60 * 60,
        }
    }
}

/// Cookie attributes shared by the access, refresh and OAuth2 state cookies
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSitePolicy,
    pub access_name: String,
    pub refresh_name: String,
    pub state_name: String,
}

impl CookiePolicy {
    /// Relaxed posture for plain-http localhost development
    pub fn development() -> Self {
        Self {
            domain: None,
            secure: false,
            same_site: SameSitePolicy::Lax,
            access_name: "ACCESS_TOKEN".to_string(),
            refresh_name: "REFRESH_TOKEN".to_string(),
            state_name: "OAUTH2_STATE".to_string(),
        }
    }

    pub fn production() -> Self {
        Self {
            secure: true,
            same_site: SameSitePolicy::Strict,
            ..Self::development()
        }
    }
}

/// Where the browser lands after an OAuth2 login attempt
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub success_url: String,
    pub failure_url: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            success_url: "http://localhost:3000/dashboard".to_string(),
            failure_url: "http://localhost:3000/login".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tokens: TokenConfig,
    pub cookies: CookiePolicy,
    pub redirects: RedirectConfig,
    pub providers: HashMap<Provider, ProviderRegistration>,
    pub attribute_mappings: HashMap<Provider, AttributeMapping>,
    pub bcrypt_cost: u32,
    pub email_webhook_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tokens: TokenConfig::default(),
            cookies: CookiePolicy::development(),
            redirects: RedirectConfig::default(),
            providers: HashMap::new(),
            attribute_mappings: default_attribute_mappings(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            email_webhook_url: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let mut config = Self {
            cookies: if production {
                CookiePolicy::production()
            } else {
                CookiePolicy::development()
            },
            ..Self::default()
        };

        // JWT_SECRET - HMAC signing key, required in production
        match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => config.tokens.secret = secret,
            _ => warn!("JWT_SECRET not set, falling back to the development signing key"),
        }
        if let Some(ttl) = env_parse::<i64>("ACCESS_TOKEN_TTL_SECS").filter(|v| *v > 0) {
            config.tokens.access_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse::<i64>("REFRESH_TOKEN_TTL_SECS").filter(|v| *v > 0) {
            config.tokens.refresh_ttl_secs = ttl;
        }
        if config.tokens.refresh_ttl_secs <= config.tokens.access_ttl_secs {
            warn!(
                access_ttl = config.tokens.access_ttl_secs,
                refresh_ttl = config.tokens.refresh_ttl_secs,
                "Refresh token TTL should be much longer than access token TTL"
            );
        }

        // Cookie posture
        if let Ok(domain) = env::var("COOKIE_DOMAIN") {
            let domain = domain.trim().to_string();
            config.cookies.domain = (!domain.is_empty()).then_some(domain);
        }
        if let Some(secure) = env_bool("COOKIE_SECURE") {
            config.cookies.secure = secure;
        }
        if let Ok(raw) = env::var("COOKIE_SAME_SITE") {
            match SameSitePolicy::parse(&raw) {
                Some(policy) => config.cookies.same_site = policy,
                None => warn!(value = %raw, "Ignoring unknown COOKIE_SAME_SITE value"),
            }
        }
        if env_bool("COOKIE_HTTP_ONLY") == Some(false) {
            warn!("COOKIE_HTTP_ONLY=false ignored: auth cookies are always HttpOnly");
        }
        if config.cookies.same_site == SameSitePolicy::None && !config.cookies.secure {
            warn!("SameSite=None requires Secure, forcing Secure=true");
            config.cookies.secure = true;
        }
        if let Ok(name) = env::var("ACCESS_COOKIE_NAME") {
            config.cookies.access_name = name;
        }
        if let Ok(name) = env::var("REFRESH_COOKIE_NAME") {
            config.cookies.refresh_name = name;
        }

        // Redirect targets
        if let Ok(url) = env::var("OAUTH2_SUCCESS_REDIRECT_URL") {
            config.redirects.success_url = url;
        }
        if let Ok(url) = env::var("OAUTH2_FAILURE_REDIRECT_URL") {
            config.redirects.failure_url = url;
        }

        // Providers are registered only when both client credentials exist
        let redirect_base = env::var("OAUTH2_REDIRECT_BASE")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        for provider in [Provider::Google, Provider::Kakao] {
            let prefix = provider.env_prefix();
            let client_id = env::var(format!("{}_CLIENT_ID", prefix)).ok();
            let client_secret = env::var(format!("{}_CLIENT_SECRET", prefix)).ok();
            match (client_id, client_secret) {
                (Some(id), Some(secret)) if !id.is_empty() => {
                    let registration =
                        ProviderRegistration::for_provider(provider, id, secret, &redirect_base);
                    info!(provider = %provider, "OAuth2 provider registered");
                    config.providers.insert(provider, registration);
                }
                _ => info!(provider = %provider, "OAuth2 provider not configured"),
            }

            if let Some(mapping) = config.attribute_mappings.get_mut(&provider) {
                mapping.apply_env_overrides(prefix);
            }
        }

        if let Some(cost) = env_parse::<u32>("BCRYPT_COST") {
            config.bcrypt_cost = cost.clamp(4, 31);
        }
        config.email_webhook_url = env::var("EMAIL_WEBHOOK_URL").ok().filter(|u| !u.is_empty());

        config
    }
}

fn default_attribute_mappings() -> HashMap<Provider, AttributeMapping> {
    HashMap::from([
        (Provider::Google, AttributeMapping::google()),
        (Provider::Kakao, AttributeMapping::kakao()),
    ])
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}
