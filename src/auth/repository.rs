//! SQLite persistence for identities and email verification codes

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error};

use super::federation::CanonicalIdentity;
use super::models::{EmailVerification, Identity, Provider};
use super::AuthError;
use crate::common::{generate_user_id, generate_verification_id};

/// Nickname given to a provisional LOCAL identity until signup completes
const PROVISIONAL_NICKNAME: &str = "pending";

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Atomic find-or-create on (provider, provider_id).
    ///
    /// On conflict the profile is refreshed, the login stamped, and a stored
    /// placeholder email for this exact identity is swapped for a real one.
    /// The swap is one-way: a stored real address never equals the
    /// placeholder, so a later payload without email leaves it alone.
    pub async fn upsert_federated(
        &self,
        identity: &CanonicalIdentity,
    ) -> Result<Identity, AuthError> {
        sqlx::query_as::<_, Identity>(
            r#"
            INSERT INTO users (
                id, email, nickname, profile_image_url, provider, provider_id,
                role, is_active, is_locked, email_verified, last_login_at
            )
            VALUES (?1, ?2, COALESCE(?3, ?6), ?4, ?5, ?6, 'USER', 1, 0, 1, datetime('now'))
            ON CONFLICT (provider, provider_id) DO UPDATE SET
                nickname = COALESCE(?3, users.nickname),
                profile_image_url = excluded.profile_image_url,
                email = CASE WHEN users.email = ?7 THEN excluded.email ELSE users.email END,
                email_verified = 1,
                last_login_at = excluded.last_login_at,
                updated_at = datetime('now')
            RETURNING *
            "#,
        )
        .bind(generate_user_id())
        .bind(&identity.email)
        .bind(identity.nickname.as_deref())
        .bind(identity.avatar.as_deref())
        .bind(identity.provider)
        .bind(&identity.provider_id)
        .bind(identity.placeholder())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(
                error = %e,
                provider = %identity.provider,
                provider_id = %identity.provider_id,
                "Database error during federated upsert"
            );
            AuthError::from_write(e)
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, AuthError> {
        let user = sqlx::query_as::<_, Identity>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_provider(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let user = sqlx::query_as::<_, Identity>(
            "SELECT * FROM users WHERE provider = ? AND provider_id = ?",
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Resolves a token subject. Oldest row wins if ids ever collide across providers.
    pub async fn find_by_subject(&self, subject: &str) -> Result<Option<Identity>, AuthError> {
        let user = sqlx::query_as::<_, Identity>(
            "SELECT * FROM users WHERE provider_id = ? ORDER BY created_at ASC, id ASC LIMIT 1",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// LOCAL identities use the email as provider id
    pub async fn find_local_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        self.find_by_provider(Provider::Local, email).await
    }

    /// True when a finished identity (verified OAuth2, or LOCAL with password) owns the email
    pub async fn email_in_use(&self, email: &str) -> Result<bool, AuthError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM users
            WHERE email = ?
              AND email_verified = 1
              AND (provider != 'LOCAL' OR password_hash IS NOT NULL)
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Idempotent under concurrent duplicate checks for the same email
    pub async fn create_provisional_local(&self, email: &str) -> Result<Identity, AuthError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (id, email, nickname, provider, provider_id, role,
                                         is_active, is_locked, email_verified)
            VALUES (?, ?, ?, 'LOCAL', ?, 'USER', 1, 0, 0)
            "#,
        )
        .bind(generate_user_id())
        .bind(email)
        .bind(PROVISIONAL_NICKNAME)
        .bind(email)
        .execute(&self.pool)
        .await?;

        debug!("Provisional LOCAL identity ensured");

        self.find_local_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn mark_email_verified(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE users SET email_verified = 1, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(AuthError::from_write)?;
        Ok(())
    }

    /// Stores the hash and nickname that complete a LOCAL signup
    pub async fn complete_local_signup(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        password_hash: &str,
        nickname: &str,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, nickname = ?, email_verified = 1, updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(nickname)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(AuthError::from_write)?;
        Ok(())
    }

    pub async fn stamp_last_login(&self, id: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET last_login_at = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn count_by_provider(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<i64, AuthError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE provider = ? AND provider_id = ?")
                .bind(provider)
                .bind(provider_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[derive(Clone)]
pub struct VerificationRepository {
    pool: SqlitePool,
}

impl VerificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<EmailVerification>, AuthError> {
        let row = sqlx::query_as::<_, EmailVerification>(
            "SELECT * FROM email_verifications WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Issues or replaces the code for an email, resetting expiry and the consumed flag
    pub async fn upsert_code(
        &self,
        email: &str,
        code: &str,
        expires_at: i64,
        user_id: &str,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO email_verifications (id, email, verification_code, expires_at, is_verified, user_id)
            VALUES (?, ?, ?, ?, 0, ?)
            ON CONFLICT (email) DO UPDATE SET
                verification_code = excluded.verification_code,
                expires_at = excluded.expires_at,
                is_verified = 0,
                user_id = excluded.user_id
            "#,
        )
        .bind(generate_verification_id())
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks the code consumed. Returns false if another request consumed it first.
    pub async fn consume(&self, conn: &mut SqliteConnection, id: &str) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE email_verifications SET is_verified = 1 WHERE id = ? AND is_verified = 0",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM email_verifications WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
