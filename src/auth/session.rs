//! Session flows: OAuth2 success and failure redirects, refresh and logout.
//!
//! Tokens only leave through cookies. Redirect locations never carry them.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cookies::CookieTransport;
use super::models::TokenKind;
use super::token::TokenCodec;
use super::AuthError;
use crate::common::config::RedirectConfig;

#[derive(Clone)]
pub struct SessionFlows {
    tokens: Arc<TokenCodec>,
    cookies: Arc<CookieTransport>,
    redirects: RedirectConfig,
}

impl SessionFlows {
    pub fn new(
        tokens: Arc<TokenCodec>,
        cookies: Arc<CookieTransport>,
        redirects: RedirectConfig,
    ) -> Self {
        Self {
            tokens,
            cookies,
            redirects,
        }
    }

    /// Issues an access and a refresh token for `subject` and writes both cookies
    pub fn issue_session(&self, headers: &mut HeaderMap, subject: &str) -> Result<(), AuthError> {
        let access = self.tokens.issue(subject, TokenKind::Access)?;
        let refresh = self.tokens.issue(subject, TokenKind::Refresh)?;

        self.cookies.set_access_cookie(headers, &access);
        self.cookies.set_refresh_cookie(headers, &refresh);
        Ok(())
    }

    /// 302 to the success URL with both session cookies set
    pub fn oauth2_success(&self, mut headers: HeaderMap, subject: &str) -> Response {
        if let Err(e) = self.issue_session(&mut headers, subject) {
            warn!(error = %e, "Could not issue session after OAuth2 login");
            return self.oauth2_failure(headers, e.classification());
        }

        info!(subject = %subject, "OAuth2 login succeeded, redirecting");
        found(&self.redirects.success_url, headers)
    }

    /// Clears both cookies and sends the browser to the failure URL with `error=<reason>`
    pub fn oauth2_failure(&self, mut headers: HeaderMap, reason: &str) -> Response {
        // Drop anything queued so far, e.g. a half-written session
        headers.remove(header::SET_COOKIE);
        self.cookies.clear_access_cookie(&mut headers);
        self.cookies.clear_refresh_cookie(&mut headers);
        self.cookies.clear_state_cookie(&mut headers);

        let location = append_query(&self.redirects.failure_url, "error", reason);
        info!(reason = %reason, "OAuth2 login failed, redirecting");
        found(&location, headers)
    }

    /// Reissues the access cookie from a valid refresh cookie. The refresh
    /// token itself is left as is. On failure nothing is written.
    pub fn refresh(&self, request_headers: &HeaderMap) -> Result<Response, AuthError> {
        let refresh_token = self
            .cookies
            .read_refresh_cookie(request_headers)
            .ok_or_else(|| {
                debug!("Refresh requested without a refresh cookie");
                AuthError::InvalidToken
            })?;

        let claims = self.tokens.verify(&refresh_token, TokenKind::Refresh)?;
        let access = self.tokens.issue(claims.subject(), TokenKind::Access)?;

        let mut headers = HeaderMap::new();
        self.cookies.set_access_cookie(&mut headers, &access);

        debug!(subject = %claims.subject(), "Access token refreshed");
        Ok((StatusCode::NO_CONTENT, headers).into_response())
    }

    /// 204 with both cookies cleared, whatever the request carried
    pub fn logout(&self) -> Response {
        let mut headers = HeaderMap::new();
        self.cookies.clear_access_cookie(&mut headers);
        self.cookies.clear_refresh_cookie(&mut headers);
        (StatusCode::NO_CONTENT, headers).into_response()
    }
}

/// Appends `key=value` with `?` or `&` depending on whether the base already has a query
pub fn append_query(base: &str, key: &str, value: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", base, separator, key, urlencoding::encode(value))
}

/// 302 Found (`Redirect::to` answers 303)
pub fn found(location: &str, mut headers: HeaderMap) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Configured redirect URL is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, headers).into_response()
        }
    }
}
