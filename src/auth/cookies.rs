//! Cookie transport for the access and refresh tokens
//!
//! Tokens only ever travel in HttpOnly cookies, never in bodies or URLs.
//! Every cookie written here, including deletions, carries the same
//! attribute set (Domain, Path=/, Secure, SameSite, HttpOnly) so that a
//! deletion always addresses the cookie that was set.

use axum::http::{header, HeaderMap, HeaderValue};
use cookie::{Cookie, SameSite};
use time::Duration;
use tracing::{debug, warn};

use crate::common::config::{CookiePolicy, SameSitePolicy};

/// Lifetime of the OAuth2 state cookie
const STATE_COOKIE_MAX_AGE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct CookieTransport {
    policy: CookiePolicy,
    access_max_age: i64,
    refresh_max_age: i64,
}

impl CookieTransport {
    /// `access_max_age`/`refresh_max_age` mirror the token TTLs in seconds
    pub fn new(policy: CookiePolicy, access_max_age: i64, refresh_max_age: i64) -> Self {
        Self {
            policy,
            access_max_age,
            refresh_max_age,
        }
    }

    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    pub fn set_access_cookie(&self, headers: &mut HeaderMap, token: &str) {
        let cookie = self.build(&self.policy.access_name, token, self.access_max_age);
        append(headers, cookie);
    }

    pub fn set_refresh_cookie(&self, headers: &mut HeaderMap, token: &str) {
        let cookie = self.build(&self.policy.refresh_name, token, self.refresh_max_age);
        append(headers, cookie);
    }

    pub fn read_access_cookie(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.policy.access_name)
    }

    pub fn read_refresh_cookie(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.policy.refresh_name)
    }

    /// Idempotent: emits the deletion whether or not the browser holds the cookie
    pub fn clear_access_cookie(&self, headers: &mut HeaderMap) {
        append(headers, self.build(&self.policy.access_name, "", 0));
    }

    pub fn clear_refresh_cookie(&self, headers: &mut HeaderMap) {
        append(headers, self.build(&self.policy.refresh_name, "", 0));
    }

    pub fn set_state_cookie(&self, headers: &mut HeaderMap, state: &str) {
        let cookie = self.build(&self.policy.state_name, state, STATE_COOKIE_MAX_AGE_SECS);
        append(headers, cookie);
    }

    pub fn read_state_cookie(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.policy.state_name)
    }

    pub fn clear_state_cookie(&self, headers: &mut HeaderMap) {
        append(headers, self.build(&self.policy.state_name, "", 0));
    }

    fn build(&self, name: &str, value: &str, max_age_secs: i64) -> Cookie<'static> {
        let same_site = match self.policy.same_site {
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::None => SameSite::None,
        };

        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .http_only(true)
            .secure(self.policy.secure || same_site == SameSite::None)
            .same_site(same_site)
            .path("/")
            .max_age(Duration::seconds(max_age_secs));

        if let Some(domain) = &self.policy.domain {
            builder = builder.domain(domain.clone());
        }

        builder.build()
    }
}

fn append(headers: &mut HeaderMap, cookie: Cookie<'static>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, cookie = %cookie.name(), "Refusing to emit malformed Set-Cookie"),
    }
}

/// Empty values count as absent: they are what a deletion leaves behind
fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let found = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw).flatten())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    if found.is_none() {
        debug!(cookie = %name, "Cookie not present on request");
    }
    found
}
