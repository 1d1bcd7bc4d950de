//! Signed token codec (HS256 JWT)
//!
//! Access and refresh tokens share the signing key and differ only in their
//! `kind` claim and lifetime. The key is loaded once at startup and never
//! rotated at runtime.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::collections::HashSet;
use tracing::debug;

use super::models::{Claims, TokenKind};
use super::AuthError;
use crate::common::config::TokenConfig;

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &TokenConfig) -> Self {
        // Expiry is checked against our own clock below, with no leeway
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims =
            HashSet::from(["exp".to_string(), "sub".to_string()]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl: Duration::seconds(config.access_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_ttl_secs),
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<String, AuthError> {
        self.issue_at(subject, kind, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl(kind)).timestamp(),
            kind,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenIssue(e.to_string()))
    }

    /// Verifies signature, structure, kind and expiry.
    /// Every failure collapses into `InvalidToken`.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        self.verify_at(token, expected, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Token rejected during decode");
                AuthError::InvalidToken
            })?
            .claims;

        if claims.kind != expected {
            debug!(expected = ?expected, actual = ?claims.kind, "Token rejected: wrong kind");
            return Err(AuthError::InvalidToken);
        }

        if now.timestamp() >= claims.exp {
            debug!(exp = claims.exp, now = now.timestamp(), "Token rejected: expired");
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }
}

impl Claims {
    pub fn subject(&self) -> &str {
        &self.sub
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}
