// src/services/oauth.rs
//! OAuth2 authorization-code client for the external identity providers

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::models::Provider;
use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth2 provider not configured: {0}")]
    NotConfigured(String),

    #[error("OAuth flow failed: {0}")]
    OAuthFailed(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<OAuthError> for AuthError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::NotConfigured(provider) => AuthError::ProviderNotConfigured(provider),
            other => AuthError::ProviderExchange(other.to_string()),
        }
    }
}

/// Client registration and endpoints for one provider
#[derive(Debug, Clone)]
pub struct ProviderRegistration {
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub user_info_url: String,
    pub scopes: Vec<String>,
    pub scope_delimiter: &'static str,
    pub redirect_uri: String,
}

impl ProviderRegistration {
    pub fn for_provider(
        provider: Provider,
        client_id: String,
        client_secret: String,
        redirect_base: &str,
    ) -> Self {
        let redirect_uri = format!(
            "{}/login/oauth2/code/{}",
            redirect_base.trim_end_matches('/'),
            provider.registration_id()
        );

        match provider {
            Provider::Kakao => Self {
                provider,
                client_id,
                client_secret,
                authorize_url: "https://kauth.kakao.com/oauth/authorize".to_string(),
                token_url: "https://kauth.kakao.com/oauth/token".to_string(),
                user_info_url: "https://kapi.kakao.com/v2/user/me".to_string(),
                scopes: vec![
                    "profile_nickname".to_string(),
                    "profile_image".to_string(),
                    "account_email".to_string(),
                ],
                scope_delimiter: ",",
                redirect_uri,
            },
            _ => Self {
                provider,
                client_id,
                client_secret,
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                user_info_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
                scopes: vec![
                    "openid".to_string(),
                    "email".to_string(),
                    "profile".to_string(),
                ],
                scope_delimiter: " ",
                redirect_uri,
            },
        }
    }

    pub fn authorization_url(&self, state: &str) -> String {
        let scope_param = self.scopes.join(self.scope_delimiter);
        let separator = if self.authorize_url.contains('?') { '&' } else { '?' };

        format!(
            "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.authorize_url,
            separator,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scope_param),
            urlencoding::encode(state)
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: Client,
    registrations: HashMap<Provider, ProviderRegistration>,
}

impl OAuthClient {
    pub fn new(registrations: HashMap<Provider, ProviderRegistration>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            registrations,
        }
    }

    pub fn registration(&self, provider: Provider) -> Result<&ProviderRegistration, OAuthError> {
        self.registrations
            .get(&provider)
            .ok_or_else(|| OAuthError::NotConfigured(provider.to_string()))
    }

    pub fn authorization_url(&self, provider: Provider, state: &str) -> Result<String, OAuthError> {
        let url = self.registration(provider)?.authorization_url(state);
        debug!(provider = %provider, "Generated OAuth2 authorization URL");
        Ok(url)
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let registration = self.registration(provider)?;

        let params = [
            ("code", code),
            ("client_id", registration.client_id.as_str()),
            ("client_secret", registration.client_secret.as_str()),
            ("redirect_uri", registration.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        debug!(provider = %provider, "Exchanging authorization code for tokens");

        let response = self
            .client
            .post(&registration.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(provider = %provider, status = %status, error = %error_text, "Token exchange failed");
            return Err(OAuthError::OAuthFailed(format!("token endpoint returned {}", status)));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| OAuthError::SerializationError(e.to_string()))
    }

    /// Fetches the raw user-info payload with the provider access token
    pub async fn fetch_user_info(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<Value, OAuthError> {
        let registration = self.registration(provider)?;

        let response = self
            .client
            .get(&registration.user_info_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OAuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!(provider = %provider, status = %status, "User-info request failed");
            return Err(OAuthError::OAuthFailed(format!("user-info endpoint returned {}", status)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| OAuthError::SerializationError(e.to_string()))
    }
}
