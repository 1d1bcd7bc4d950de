//! Local email/password path: duplicate check, one-time code verification,
//! signup completion and login.

use chrono::Utc;
use rand::Rng;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::models::Identity;
use super::repository::{UserRepository, VerificationRepository};
use super::AuthError;
use crate::common::safe_email_log;
use crate::services::{PasswordHasher, VerificationNotifier};

/// Lifetime of a verification code
pub const VERIFICATION_TTL_SECS: i64 = 5 * 60;

/// Outcome of `check_email_duplicate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// A finished identity already owns the address
    Duplicate,
    /// Address is free; a code was sent to it
    CodeSent,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_code() -> String {
    rand::thread_rng().gen_range(1000..10000).to_string()
}

#[derive(Clone)]
pub struct EmailAuthService {
    db: SqlitePool,
    users: UserRepository,
    verifications: VerificationRepository,
    notifier: Arc<dyn VerificationNotifier>,
    hasher: Arc<dyn PasswordHasher>,
}

impl EmailAuthService {
    pub fn new(
        db: SqlitePool,
        users: UserRepository,
        verifications: VerificationRepository,
        notifier: Arc<dyn VerificationNotifier>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            db,
            users,
            verifications,
            notifier,
            hasher,
        }
    }

    pub async fn check_email_duplicate(&self, email: &str) -> Result<DuplicateCheck, AuthError> {
        let email = normalize_email(email);

        if self.users.email_in_use(&email).await? {
            debug!(email = %safe_email_log(&email), "Email already owned by a finished identity");
            return Ok(DuplicateCheck::Duplicate);
        }

        let provisional = self.users.create_provisional_local(&email).await?;
        self.issue_code(&email, &provisional.id).await?;

        info!(
            user_id = %provisional.id,
            email = %safe_email_log(&email),
            "Verification code issued"
        );
        Ok(DuplicateCheck::CodeSent)
    }

    /// True only for an unconsumed, unexpired, matching code. The check
    /// consumes the code; a mismatch replaces it with a fresh one.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<bool, AuthError> {
        let email = normalize_email(email);
        let Some(verification) = self.verifications.find_by_email(&email).await? else {
            debug!(email = %safe_email_log(&email), "No verification pending");
            return Ok(false);
        };

        if verification.is_verified {
            debug!(email = %safe_email_log(&email), "Verification code already consumed");
            return Ok(false);
        }

        let now = Utc::now().timestamp();
        if verification.verification_code == code.trim() && now < verification.expires_at {
            // Consuming the code and verifying the identity commit together
            let mut tx = self.db.begin().await?;
            if !self.verifications.consume(&mut *tx, &verification.id).await? {
                return Ok(false);
            }
            if let Err(e) = self
                .users
                .mark_email_verified(&mut *tx, &verification.user_id)
                .await
            {
                warn!(
                    user_id = %verification.user_id,
                    email = %safe_email_log(&email),
                    error = %e,
                    "Could not mark email verified, code left unconsumed"
                );
                return Err(e);
            }
            tx.commit().await?;

            info!(
                user_id = %verification.user_id,
                email = %safe_email_log(&email),
                "Email verified"
            );
            return Ok(true);
        }

        warn!(email = %safe_email_log(&email), "Verification code mismatch or expired, reissuing");
        self.issue_code(&email, &verification.user_id).await?;
        Ok(false)
    }

    /// Seconds left on a pending code; 0 when absent, consumed or expired
    pub async fn remaining_time(&self, email: &str) -> Result<i64, AuthError> {
        let email = normalize_email(email);
        let remaining = match self.verifications.find_by_email(&email).await? {
            Some(v) if !v.is_verified => (v.expires_at - Utc::now().timestamp()).max(0),
            _ => 0,
        };
        Ok(remaining)
    }

    pub async fn complete_signup(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        let verification = self
            .verifications
            .find_by_email(&email)
            .await?
            .filter(|v| v.is_verified)
            .ok_or(AuthError::EmailNotVerified)?;

        let user = self
            .users
            .find_by_id(&verification.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let hasher = self.hasher.clone();
        let plain = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| AuthError::PasswordHash(e.to_string()))??;

        let nickname = email.split('@').next().unwrap_or(&email).to_string();
        let mut tx = self.db.begin().await?;
        self.users
            .complete_local_signup(&mut *tx, &user.id, &password_hash, &nickname)
            .await?;
        self.verifications.delete(&mut *tx, &verification.id).await?;
        tx.commit().await?;

        info!(user_id = %user.id, email = %safe_email_log(&email), "Local signup completed");

        self.users
            .find_by_id(&user.id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Check order: exists, signup finished, password, active, not locked
    pub async fn login_with_email(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_local_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let Some(stored_hash) = user.password_hash.clone().filter(|_| user.email_verified) else {
            return Err(AuthError::EmailNotVerified);
        };

        let hasher = self.hasher.clone();
        let plain = password.to_string();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&plain, &stored_hash))
            .await
            .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
        if !matches {
            warn!(email = %safe_email_log(&email), "Local login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }
        if user.is_locked {
            return Err(AuthError::AccountLocked);
        }

        self.users.stamp_last_login(&user.id).await?;
        info!(user_id = %user.id, email = %safe_email_log(&email), "Local login succeeded");
        Ok(user)
    }

    async fn issue_code(&self, email: &str, user_id: &str) -> Result<(), AuthError> {
        let code = generate_code();
        let expires_at = Utc::now().timestamp() + VERIFICATION_TTL_SECS;
        self.verifications
            .upsert_code(email, &code, expires_at, user_id)
            .await?;
        self.notifier.send_verification_code(email, &code);
        Ok(())
    }
}
