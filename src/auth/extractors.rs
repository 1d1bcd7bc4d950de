//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::Identity;
use super::AuthError;
use crate::common::{ApiError, AppState};

/// Subject bound to the request by the authentication gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Provider id carried in the access token
    pub subject: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            debug!(path = %parts.uri.path(), "No principal bound to request");
            ApiError::from(AuthError::InvalidToken)
        })
    }
}

/// Principal resolved to its stored identity
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;

        let Extension(app_state): Extension<Arc<AppState>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let identity = app_state
            .users
            .find_by_subject(&principal.subject)
            .await?
            .ok_or_else(|| {
                warn!(subject = %principal.subject, "Principal has no stored identity");
                AuthError::UserNotFound
            })?;

        Ok(CurrentUser { identity })
    }
}
