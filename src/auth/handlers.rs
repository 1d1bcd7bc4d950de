//! Authentication handlers

use axum::{
    extract::{Extension, Json, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::email::DuplicateCheck;
use super::extractors::CurrentUser;
use super::models::{
    EmailCredentials, EmailQuery, Identity, OAuthCallbackParams, Provider, UserResponse,
    VerifyCodeQuery,
};
use super::session::found;
use super::validators::EmailAuthValidator;
use super::AuthError;
use crate::common::{generate_raw_id, safe_email_log, ApiError, AppState, Validator};

/// Length of the random OAuth2 `state` value
const OAUTH2_STATE_LENGTH: usize = 32;

// ---- Session endpoints ----

/// POST /auth/refresh
/// 204 with a fresh access cookie, or 401 without touching any cookie
pub async fn refresh_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    match state.sessions.refresh(&headers) {
        Ok(response) => response,
        Err(e) => {
            debug!(reason = %e.classification(), "Refresh rejected");
            ApiError::from(e).into_response()
        }
    }
}

/// POST /auth/logout
/// Always 204; both session cookies are cleared
pub async fn logout_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    info!("Logout requested");
    state.sessions.logout()
}

// ---- OAuth2 authorization-code flow ----

/// GET /oauth2/authorization/:provider
/// Stores a random state in a short-lived cookie and redirects to the provider
pub async fn oauth2_authorize(
    Extension(state): Extension<Arc<AppState>>,
    Path(registration_id): Path<String>,
) -> Response {
    let authorization_url = Provider::from_registration_id(&registration_id).and_then(|provider| {
        let oauth_state = generate_raw_id(OAUTH2_STATE_LENGTH);
        let url = state
            .oauth
            .authorization_url(provider, &oauth_state)
            .map_err(AuthError::from)?;
        Ok((oauth_state, url))
    });

    match authorization_url {
        Ok((oauth_state, url)) => {
            let mut headers = HeaderMap::new();
            state.cookies.set_state_cookie(&mut headers, &oauth_state);
            info!(provider = %registration_id, "Starting OAuth2 authorization");
            found(&url, headers)
        }
        Err(e) => {
            warn!(provider = %registration_id, error = %e, "Cannot start OAuth2 authorization");
            state
                .sessions
                .oauth2_failure(HeaderMap::new(), e.classification())
        }
    }
}

/// GET /login/oauth2/code/:provider
/// Provider callback: exchange, reconcile, then the success or failure redirect
pub async fn oauth2_callback(
    Extension(state): Extension<Arc<AppState>>,
    Path(registration_id): Path<String>,
    Query(params): Query<OAuthCallbackParams>,
    headers: HeaderMap,
) -> Response {
    match complete_oauth2_login(&state, &registration_id, params, &headers).await {
        Ok(identity) => {
            let mut response_headers = HeaderMap::new();
            state.cookies.clear_state_cookie(&mut response_headers);
            state
                .sessions
                .oauth2_success(response_headers, &identity.provider_id)
        }
        Err(e) => {
            warn!(provider = %registration_id, error = %e, "OAuth2 callback failed");
            state
                .sessions
                .oauth2_failure(HeaderMap::new(), e.classification())
        }
    }
}

async fn complete_oauth2_login(
    state: &AppState,
    registration_id: &str,
    params: OAuthCallbackParams,
    headers: &HeaderMap,
) -> Result<Identity, AuthError> {
    if let Some(error) = params.error {
        return Err(AuthError::ProviderDenied(error));
    }

    let provider = Provider::from_registration_id(registration_id)?;

    let expected_state = state.cookies.read_state_cookie(headers);
    match (expected_state.as_deref(), params.state.as_deref()) {
        (Some(expected), Some(received)) if expected == received => {}
        _ => return Err(AuthError::InvalidState),
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::ProviderExchange("authorization code missing".to_string()))?;

    let tokens = state.oauth.exchange_code(provider, &code).await?;
    let raw = state.oauth.fetch_user_info(provider, &tokens.access_token).await?;

    state.federator.reconcile(registration_id, &raw).await
}

// ---- Principal consumers ----

/// GET /api/users/me
///
/// # Response
/// ```json
/// {
///   "id": "U_XXXXXXXXXX",
///   "email": "nurse@ward.example",
///   "nickname": "nurse",
///   "profileImageUrl": null,
///   "provider": "GOOGLE",
///   "role": "USER"
/// }
/// ```
pub async fn me_handler(user: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user.identity))
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ---- Local email/password path ----

/// GET /auth/email/check?email=
///
/// # Response
/// ```json
/// { "isDuplicate": false, "message": "Verification code sent" }
/// ```
pub async fn check_email_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    EmailAuthValidator.validate(&query).into_result()?;

    let outcome = state.email_auth.check_email_duplicate(&query.email).await?;
    let resp = match outcome {
        DuplicateCheck::Duplicate => json!({
            "isDuplicate": true,
            "message": "Email is already registered"
        }),
        DuplicateCheck::CodeSent => json!({
            "isDuplicate": false,
            "message": "Verification code sent"
        }),
    };
    Ok(Json(resp))
}

/// GET /auth/email/verify-code?email=&code=
pub async fn verify_code_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<VerifyCodeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    EmailAuthValidator.validate(&query).into_result()?;

    let is_match = state
        .email_auth
        .verify_code(&query.email, &query.code)
        .await?;
    Ok(Json(json!({ "isMatch": is_match })))
}

/// GET /auth/email/remaining-time?email=
pub async fn remaining_time_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let remaining = state.email_auth.remaining_time(&query.email).await?;
    Ok(Json(json!({ "remainingSeconds": remaining })))
}

/// POST /auth/email/signup
/// Sets the password once the email's code has been verified
pub async fn signup_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<EmailCredentials>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    EmailAuthValidator.validate(&payload).into_result()?;

    let identity = state
        .email_auth
        .complete_signup(&payload.email, &payload.password)
        .await?;

    info!(user_id = %identity.id, email = %safe_email_log(&identity.email), "Signup handler completed");
    Ok((StatusCode::CREATED, Json(UserResponse::from(&identity))))
}

/// POST /auth/email/login
/// Sets both session cookies and returns the user
pub async fn login_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<EmailCredentials>,
) -> Result<Response, ApiError> {
    let identity = state
        .email_auth
        .login_with_email(&payload.email, &payload.password)
        .await?;

    let mut headers = HeaderMap::new();
    state
        .sessions
        .issue_session(&mut headers, &identity.provider_id)?;

    Ok((headers, Json(UserResponse::from(&identity))).into_response())
}
