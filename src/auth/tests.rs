//! Tests for auth module
//!
//! These tests verify:
//! - Token issue/verify, expiry boundary, tampering and kind checks
//! - Cookie attributes and deletion
//! - Identity federation against an in-memory SQLite store
//! - The local email/password path
//! - The HTTP session scenarios through the real router

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::common::config::{AppConfig, CookiePolicy, SameSitePolicy, TokenConfig};
    use crate::common::migrations::run_migrations;
    use crate::common::AppState;
    use crate::services::oauth::ProviderRegistration;
    use crate::services::{BcryptHasher, VerificationNotifier};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
    use axum::response::Response;
    use chrono::{Duration, Utc};
    use cookie::Cookie;
    use super::super::models::{Provider, Role, TokenKind};
    use serde_json::{json, Value};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use std::sync::{Arc, Mutex};
    use super::super::token::TokenCodec;
    use tower::ServiceExt;

    const SUCCESS_URL: &str = "https://ward.example/app";
    const FAILURE_URL: &str = "https://ward.example/login?from=oauth";

    // ---- Fixtures ----

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn codes(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        fn last_code(&self) -> String {
            self.codes().last().map(|(_, code)| code.clone()).unwrap()
        }
    }

    impl VerificationNotifier for RecordingNotifier {
        fn send_verification_code(&self, email: &str, code: &str) {
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), code.to_string()));
        }
    }

    fn token_config() -> TokenConfig {
        TokenConfig {
            secret: "test_secret_key".to_string(),
            access_ttl_secs: 1800,
            refresh_ttl_secs: 1_209_600,
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.tokens = token_config();
        config.redirects.success_url = SUCCESS_URL.to_string();
        config.redirects.failure_url = FAILURE_URL.to_string();
        config.bcrypt_cost = 4;
        config
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    /// Several connections onto one shared-cache in-memory database
    async fn shared_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .min_connections(4)
            .max_connections(4)
            .connect("sqlite::memory:")
            .await
            .expect("shared in-memory sqlite");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    fn state_on(pool: SqlitePool, config: AppConfig) -> (Arc<AppState>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(
            pool,
            config,
            notifier.clone(),
            Arc::new(BcryptHasher::new(4)),
        );
        (Arc::new(state), notifier)
    }

    async fn test_state_with(config: AppConfig) -> (Arc<AppState>, Arc<RecordingNotifier>) {
        state_on(test_pool().await, config)
    }

    async fn test_state() -> (Arc<AppState>, Arc<RecordingNotifier>) {
        test_state_with(test_config()).await
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn location(response: &Response) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response {
        crate::build_app(state.clone()).oneshot(request).await.unwrap()
    }

    fn google_payload(sub: &str, email: &str, name: &str) -> Value {
        json!({
            "sub": sub,
            "email": email,
            "email_verified": true,
            "name": name,
            "picture": "https://lh3.example/avatar.png"
        })
    }

    // ---- TokenCodec ----

    #[test]
    fn test_issue_then_verify_returns_subject() {
        let codec = TokenCodec::new(&token_config());

        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let token = codec.issue("g123", kind).unwrap();
            let claims = codec.verify(&token, kind).unwrap();
            assert_eq!(claims.subject(), "g123");
            assert_eq!(claims.kind, kind);
            assert!(claims.expires_at().unwrap() > claims.issued_at().unwrap());
        }
    }

    #[test]
    fn test_expiry_follows_kind_ttl() {
        let codec = TokenCodec::new(&token_config());
        let now = Utc::now();

        let access = codec.issue_at("g123", TokenKind::Access, now).unwrap();
        let refresh = codec.issue_at("g123", TokenKind::Refresh, now).unwrap();

        let access_claims = codec.verify_at(&access, TokenKind::Access, now).unwrap();
        let refresh_claims = codec.verify_at(&refresh, TokenKind::Refresh, now).unwrap();
        assert_eq!(access_claims.exp - access_claims.iat, 1800);
        assert_eq!(refresh_claims.exp - refresh_claims.iat, 1_209_600);
    }

    #[test]
    fn test_token_invalid_from_expiry_onwards() {
        let codec = TokenCodec::new(&token_config());
        let issued = Utc::now();
        let token = codec.issue_at("g123", TokenKind::Access, issued).unwrap();
        let ttl = codec.ttl(TokenKind::Access);

        assert!(codec
            .verify_at(&token, TokenKind::Access, issued + ttl - Duration::seconds(1))
            .is_ok());
        assert!(matches!(
            codec.verify_at(&token, TokenKind::Access, issued + ttl),
            Err(AuthError::InvalidToken)
        ));
        assert!(codec
            .verify_at(&token, TokenKind::Access, issued + ttl + Duration::days(3))
            .is_err());
    }

    #[test]
    fn test_every_tampered_character_is_rejected() {
        const ALPHABET: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        let codec = TokenCodec::new(&token_config());
        let token = codec.issue("g123", TokenKind::Access).unwrap();

        for (i, byte) in token.bytes().enumerate() {
            if byte == b'.' {
                continue;
            }
            let value = ALPHABET.iter().position(|c| *c == byte).unwrap();
            // +16 changes a bit that carries data even in the last sextet
            let replacement = ALPHABET[(value + 16) % 64];
            let mut tampered = token.clone().into_bytes();
            tampered[i] = replacement;
            let tampered = String::from_utf8(tampered).unwrap();

            assert!(
                codec.verify(&tampered, TokenKind::Access).is_err(),
                "tampered token at index {} verified",
                i
            );
        }
    }

    #[test]
    fn test_wrong_kind_and_wrong_key_are_rejected() {
        let codec = TokenCodec::new(&token_config());
        let refresh = codec.issue("g123", TokenKind::Refresh).unwrap();
        assert!(codec.verify(&refresh, TokenKind::Access).is_err());

        let other = TokenCodec::new(&TokenConfig {
            secret: "another_secret".to_string(),
            ..token_config()
        });
        let foreign = other.issue("g123", TokenKind::Access).unwrap();
        assert!(codec.verify(&foreign, TokenKind::Access).is_err());

        assert!(codec.verify("not-a-token", TokenKind::Access).is_err());
        assert!(codec.verify("", TokenKind::Access).is_err());
    }

    // ---- CookieTransport ----

    #[test]
    fn test_development_cookie_attributes() {
        let transport = cookies::CookieTransport::new(CookiePolicy::development(), 1800, 1_209_600);
        let mut headers = HeaderMap::new();
        transport.set_access_cookie(&mut headers, "tok");
        transport.set_refresh_cookie(&mut headers, "rtok");

        let written = set_cookies(&headers);
        assert_eq!(written.len(), 2);

        let access = Cookie::parse(written[0].clone()).unwrap();
        assert_eq!(access.name(), "ACCESS_TOKEN");
        assert_eq!(access.value(), "tok");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(access.same_site(), Some(cookie::SameSite::Lax));
        assert_ne!(access.secure(), Some(true));
        assert_eq!(access.max_age(), Some(time::Duration::seconds(1800)));

        let refresh = Cookie::parse(written[1].clone()).unwrap();
        assert_eq!(refresh.name(), "REFRESH_TOKEN");
        assert_eq!(refresh.max_age(), Some(time::Duration::seconds(1_209_600)));
    }

    #[test]
    fn test_production_cookie_attributes_with_domain() {
        let mut policy = CookiePolicy::production();
        policy.domain = Some("ward.example".to_string());
        let transport = cookies::CookieTransport::new(policy, 1800, 1_209_600);

        let mut headers = HeaderMap::new();
        transport.set_access_cookie(&mut headers, "tok");
        let access = Cookie::parse(set_cookies(&headers)[0].clone()).unwrap();

        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.same_site(), Some(cookie::SameSite::Strict));
        assert_eq!(access.domain(), Some("ward.example"));
        assert_eq!(access.http_only(), Some(true));
    }

    #[test]
    fn test_same_site_none_forces_secure() {
        let policy = CookiePolicy {
            same_site: SameSitePolicy::None,
            secure: false,
            ..CookiePolicy::development()
        };
        let transport = cookies::CookieTransport::new(policy, 60, 120);
        let mut headers = HeaderMap::new();
        transport.set_access_cookie(&mut headers, "tok");

        let access = Cookie::parse(set_cookies(&headers)[0].clone()).unwrap();
        assert_eq!(access.same_site(), Some(cookie::SameSite::None));
        assert_eq!(access.secure(), Some(true));
    }

    #[test]
    fn test_clear_is_idempotent_and_attribute_complete() {
        let mut policy = CookiePolicy::production();
        policy.domain = Some("ward.example".to_string());
        let transport = cookies::CookieTransport::new(policy, 1800, 1_209_600);

        let mut first = HeaderMap::new();
        transport.clear_access_cookie(&mut first);
        transport.clear_refresh_cookie(&mut first);
        let mut second = HeaderMap::new();
        transport.clear_access_cookie(&mut second);
        transport.clear_refresh_cookie(&mut second);

        assert_eq!(set_cookies(&first), set_cookies(&second));
        for raw in set_cookies(&first) {
            let cleared = Cookie::parse(raw).unwrap();
            assert_eq!(cleared.value(), "");
            assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
            assert_eq!(cleared.path(), Some("/"));
            assert_eq!(cleared.domain(), Some("ward.example"));
            assert_eq!(cleared.http_only(), Some(true));
            assert_eq!(cleared.secure(), Some(true));
        }
    }

    #[test]
    fn test_read_cookie_from_request() {
        let transport = cookies::CookieTransport::new(CookiePolicy::development(), 1800, 1_209_600);

        let mut headers = HeaderMap::new();
        assert_eq!(transport.read_access_cookie(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; ACCESS_TOKEN=abc.def.ghi"),
        );
        assert_eq!(
            transport.read_access_cookie(&headers).as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(transport.read_refresh_cookie(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("REFRESH_TOKEN="));
        assert_eq!(transport.read_refresh_cookie(&headers), None);
    }

    // ---- IdentityFederator ----

    #[tokio::test]
    async fn test_new_google_login_creates_identity() {
        let (state, _) = test_state().await;

        let identity = state
            .federator
            .reconcile("google", &google_payload("g123", "a@x.com", "Nurse Kim"))
            .await
            .unwrap();

        assert_eq!(identity.provider, Provider::Google);
        assert_eq!(identity.provider_id, "g123");
        assert_eq!(identity.email, "a@x.com");
        assert_eq!(identity.nickname, "Nurse Kim");
        assert_eq!(identity.role, Role::User);
        assert!(identity.is_active);
        assert!(!identity.is_locked);
        assert!(identity.email_verified);
        assert!(identity.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_repeat_login_updates_same_row() {
        let (state, _) = test_state().await;

        let first = state
            .federator
            .reconcile("google", &google_payload("g123", "a@x.com", "Nurse Kim"))
            .await
            .unwrap();
        let second = state
            .federator
            .reconcile("google", &google_payload("g123", "a@x.com", "Charge Nurse Kim"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.nickname, "Charge Nurse Kim");
        assert_eq!(
            state.users.count_by_provider(Provider::Google, "g123").await.unwrap(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logins_create_one_row() {
        let (state, _) = state_on(shared_pool().await, test_config());
        let payload = google_payload("g-race", "race@x.com", "Racer");

        let mut logins = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let state = state.clone();
            let payload = payload.clone();
            logins.spawn(async move { state.federator.reconcile("google", &payload).await });
        }

        let mut ids = Vec::new();
        while let Some(joined) = logins.join_next().await {
            ids.push(joined.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(
            state.users.count_by_provider(Provider::Google, "g-race").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_kakao_without_email_gets_placeholder() {
        let (state, _) = test_state().await;

        let identity = state
            .federator
            .reconcile("kakao", &json!({ "id": "k9" }))
            .await
            .unwrap();

        assert_eq!(identity.provider, Provider::Kakao);
        assert_eq!(identity.email, "k9@kakao.local");
        assert_eq!(identity.nickname, "k9");
    }

    #[tokio::test]
    async fn test_kakao_numeric_id_and_nested_profile() {
        let (state, _) = test_state().await;
        let payload = json!({
            "id": 4242,
            "kakao_account": {
                "email": "ward@kakao.example",
                "is_email_valid": true,
                "is_email_verified": true,
                "profile": {
                    "nickname": "Dr. Lee",
                    "profile_image_url": "https://k.example/p.png"
                }
            }
        });

        let identity = state.federator.reconcile("kakao", &payload).await.unwrap();

        assert_eq!(identity.provider_id, "4242");
        assert_eq!(identity.email, "ward@kakao.example");
        assert_eq!(identity.nickname, "Dr. Lee");
        assert_eq!(
            identity.profile_image_url.as_deref(),
            Some("https://k.example/p.png")
        );
    }

    #[tokio::test]
    async fn test_placeholder_replacement_is_one_way() {
        let (state, _) = test_state().await;

        let placeholder = state
            .federator
            .reconcile("kakao", &json!({ "id": "k9" }))
            .await
            .unwrap();
        assert_eq!(placeholder.email, "k9@kakao.local");

        let with_email = json!({
            "id": "k9",
            "kakao_account": { "email": "real@kakao.example" }
        });
        let upgraded = state.federator.reconcile("kakao", &with_email).await.unwrap();
        assert_eq!(upgraded.id, placeholder.id);
        assert_eq!(upgraded.email, "real@kakao.example");

        let again = state
            .federator
            .reconcile("kakao", &json!({ "id": "k9" }))
            .await
            .unwrap();
        assert_eq!(again.email, "real@kakao.example");
    }

    #[tokio::test]
    async fn test_unverified_google_email_is_not_trusted() {
        let (state, _) = test_state().await;
        let payload = json!({
            "sub": "g777",
            "email": "unverified@x.com",
            "email_verified": false
        });

        let identity = state.federator.reconcile("google", &payload).await.unwrap();
        assert_eq!(identity.email, "g777@google.local");
    }

    #[tokio::test]
    async fn test_name_falls_back_to_email_local_part() {
        let (state, _) = test_state().await;
        let payload = json!({ "sub": "g5", "email": "head.nurse@x.com" });

        let identity = state.federator.reconcile("google", &payload).await.unwrap();
        assert_eq!(identity.nickname, "head.nurse");
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_closed() {
        let (state, _) = test_state().await;
        let payload = google_payload("g123", "a@x.com", "Nurse Kim");

        for registration_id in ["github", "local", ""] {
            let err = state
                .federator
                .reconcile(registration_id, &payload)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::UnsupportedProvider(_)));
        }
    }

    #[tokio::test]
    async fn test_payload_without_subject_is_rejected() {
        let (state, _) = test_state().await;
        let err = state
            .federator
            .reconcile("google", &json!({ "email": "a@x.com" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingSubject));
    }

    #[tokio::test]
    async fn test_verified_email_owned_by_other_provider_conflicts() {
        let (state, _) = test_state().await;
        state
            .federator
            .reconcile("google", &google_payload("g123", "a@x.com", "Nurse Kim"))
            .await
            .unwrap();

        let err = state
            .federator
            .reconcile(
                "kakao",
                &json!({ "id": "k1", "kakao_account": { "email": "a@x.com" } }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailConflict));
        assert_eq!(err.classification(), "email_already_registered");
    }

    #[tokio::test]
    async fn test_provider_email_is_stored_lowercased() {
        let (state, notifier) = test_state().await;
        let identity = state
            .federator
            .reconcile("google", &google_payload("g123", "Nurse@Ward.example", "Nurse Kim"))
            .await
            .unwrap();
        assert_eq!(identity.email, "nurse@ward.example");

        assert_eq!(
            state
                .email_auth
                .check_email_duplicate("nurse@ward.example")
                .await
                .unwrap(),
            email::DuplicateCheck::Duplicate
        );
        assert!(notifier.codes().is_empty());
    }

    #[tokio::test]
    async fn test_verified_email_unique_ignoring_case() {
        let (state, _) = test_state().await;
        state
            .federator
            .reconcile("google", &google_payload("g123", "nurse@ward.example", "Nurse Kim"))
            .await
            .unwrap();

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, email, nickname, provider, provider_id, email_verified)
            VALUES ('U_MIXEDCASE', 'Nurse@Ward.Example', 'nurse', 'LOCAL', 'Nurse@Ward.Example', 1)
            "#,
        )
        .execute(&state.db)
        .await;
        assert!(matches!(
            AuthError::from_write(inserted.unwrap_err()),
            AuthError::EmailConflict
        ));

        let (verified,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE email = 'NURSE@ward.example' AND email_verified = 1",
        )
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(verified, 1);
    }

    // ---- Local email path ----

    #[tokio::test]
    async fn test_local_signup_and_login() {
        let (state, notifier) = test_state().await;
        let email_auth = &state.email_auth;

        let outcome = email_auth.check_email_duplicate("New.Nurse@Ward.example").await.unwrap();
        assert_eq!(outcome, email::DuplicateCheck::CodeSent);
        assert_eq!(notifier.codes().len(), 1);
        assert_eq!(notifier.codes()[0].0, "new.nurse@ward.example");

        let remaining = email_auth.remaining_time("new.nurse@ward.example").await.unwrap();
        assert!(remaining > 0 && remaining <= email::VERIFICATION_TTL_SECS);

        // Codes are 1000..=9999, so this never matches
        assert!(!email_auth.verify_code("new.nurse@ward.example", "0000").await.unwrap());
        assert_eq!(notifier.codes().len(), 2);

        let code = notifier.last_code();
        assert_eq!(code.len(), 4);
        assert!(email_auth.verify_code("new.nurse@ward.example", &code).await.unwrap());
        assert!(!email_auth.verify_code("new.nurse@ward.example", &code).await.unwrap());
        assert_eq!(email_auth.remaining_time("new.nurse@ward.example").await.unwrap(), 0);

        let identity = email_auth
            .complete_signup("new.nurse@ward.example", "correct horse")
            .await
            .unwrap();
        assert_eq!(identity.provider, Provider::Local);
        assert_eq!(identity.nickname, "new.nurse");
        assert!(identity.is_signup_complete());

        assert_eq!(
            email_auth.check_email_duplicate("new.nurse@ward.example").await.unwrap(),
            email::DuplicateCheck::Duplicate
        );

        let logged_in = email_auth
            .login_with_email("new.nurse@ward.example", "correct horse")
            .await
            .unwrap();
        assert_eq!(logged_in.id, identity.id);

        assert!(matches!(
            email_auth
                .login_with_email("new.nurse@ward.example", "wrong horse")
                .await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_signup_requires_verified_code() {
        let (state, _) = test_state().await;
        state
            .email_auth
            .check_email_duplicate("pending@ward.example")
            .await
            .unwrap();

        assert!(matches!(
            state
                .email_auth
                .complete_signup("pending@ward.example", "password123")
                .await,
            Err(AuthError::EmailNotVerified)
        ));
        assert!(matches!(
            state
                .email_auth
                .login_with_email("pending@ward.example", "password123")
                .await,
            Err(AuthError::EmailNotVerified)
        ));
        assert!(matches!(
            state
                .email_auth
                .login_with_email("nobody@ward.example", "password123")
                .await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_code_does_not_verify() {
        let (state, notifier) = test_state().await;
        state
            .email_auth
            .check_email_duplicate("late@ward.example")
            .await
            .unwrap();
        let code = notifier.last_code();

        sqlx::query("UPDATE email_verifications SET expires_at = ? WHERE email = ?")
            .bind(Utc::now().timestamp() - 1)
            .bind("late@ward.example")
            .execute(&state.db)
            .await
            .unwrap();

        assert_eq!(state.email_auth.remaining_time("late@ward.example").await.unwrap(), 0);
        assert!(!state
            .email_auth
            .verify_code("late@ward.example", &code)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_locked_and_inactive_accounts_cannot_log_in() {
        let (state, notifier) = test_state().await;
        let email_auth = &state.email_auth;
        email_auth.check_email_duplicate("flagged@ward.example").await.unwrap();
        email_auth
            .verify_code("flagged@ward.example", &notifier.last_code())
            .await
            .unwrap();
        let identity = email_auth
            .complete_signup("flagged@ward.example", "password123")
            .await
            .unwrap();

        sqlx::query("UPDATE users SET is_locked = 1 WHERE id = ?")
            .bind(&identity.id)
            .execute(&state.db)
            .await
            .unwrap();
        assert!(matches!(
            email_auth.login_with_email("flagged@ward.example", "password123").await,
            Err(AuthError::AccountLocked)
        ));

        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(&identity.id)
            .execute(&state.db)
            .await
            .unwrap();
        assert!(matches!(
            email_auth.login_with_email("flagged@ward.example", "password123").await,
            Err(AuthError::AccountInactive)
        ));
    }

    #[tokio::test]
    async fn test_email_owned_by_oauth_identity_is_duplicate() {
        let (state, notifier) = test_state().await;
        state
            .federator
            .reconcile("google", &google_payload("g123", "a@x.com", "Nurse Kim"))
            .await
            .unwrap();

        assert_eq!(
            state.email_auth.check_email_duplicate("a@x.com").await.unwrap(),
            email::DuplicateCheck::Duplicate
        );
        assert!(notifier.codes().is_empty());
    }

    #[tokio::test]
    async fn test_verify_conflict_leaves_code_unconsumed() {
        let (state, notifier) = test_state().await;
        state
            .email_auth
            .check_email_duplicate("a@x.com")
            .await
            .unwrap();
        let code = notifier.last_code();

        // An OAuth2 login claims the address before the code is entered
        state
            .federator
            .reconcile("google", &google_payload("g123", "a@x.com", "Nurse Kim"))
            .await
            .unwrap();

        assert!(matches!(
            state.email_auth.verify_code("a@x.com", &code).await,
            Err(AuthError::EmailConflict)
        ));

        let (consumed,): (bool,) =
            sqlx::query_as("SELECT is_verified FROM email_verifications WHERE email = ?")
                .bind("a@x.com")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert!(!consumed);

        let local = state.users.find_local_by_email("a@x.com").await.unwrap().unwrap();
        assert!(!local.email_verified);
        assert!(state.email_auth.remaining_time("a@x.com").await.unwrap() > 0);
    }

    // ---- Session flows ----

    #[tokio::test]
    async fn test_oauth2_success_sets_both_cookies_and_redirects() {
        let (state, _) = test_state().await;
        let response = state.sessions.oauth2_success(HeaderMap::new(), "g123");

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), SUCCESS_URL);

        let written = set_cookies(response.headers());
        assert_eq!(written.len(), 2);
        let access = Cookie::parse(written[0].clone()).unwrap();
        let refresh = Cookie::parse(written[1].clone()).unwrap();
        assert_eq!(access.name(), "ACCESS_TOKEN");
        assert_eq!(refresh.name(), "REFRESH_TOKEN");

        let claims = state.tokens.verify(access.value(), TokenKind::Access).unwrap();
        assert_eq!(claims.subject(), "g123");
        let claims = state.tokens.verify(refresh.value(), TokenKind::Refresh).unwrap();
        assert_eq!(claims.subject(), "g123");

        assert!(!location(&response).contains(access.value()));
    }

    #[tokio::test]
    async fn test_oauth2_failure_clears_cookies_and_encodes_reason() {
        let (state, _) = test_state().await;
        let mut pending = HeaderMap::new();
        state.cookies.set_access_cookie(&mut pending, "half-written");

        let response = state.sessions.oauth2_failure(pending, "access denied");

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "https://ward.example/login?from=oauth&error=access%20denied"
        );
        let written = set_cookies(response.headers());
        assert!(written.iter().all(|c| !c.contains("half-written")));
        assert!(written.iter().any(|c| c.starts_with("ACCESS_TOKEN=;")));
        assert!(written.iter().any(|c| c.starts_with("REFRESH_TOKEN=;")));
    }

    #[test]
    fn test_append_query_separator() {
        assert_eq!(
            session::append_query("https://ward.example/login", "error", "invalid_state"),
            "https://ward.example/login?error=invalid_state"
        );
        assert_eq!(
            session::append_query("https://ward.example/login?lang=ko", "error", "a&b"),
            "https://ward.example/login?lang=ko&error=a%26b"
        );
    }

    // ---- HTTP scenarios ----

    #[tokio::test]
    async fn test_refresh_without_refresh_cookie_is_401_without_cookies() {
        let (state, _) = test_state().await;
        let access = state.tokens.issue("g123", TokenKind::Access).unwrap();

        let response = send(
            &state,
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header(header::COOKIE, format!("ACCESS_TOKEN={}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(response.headers()).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_with_expired_refresh_cookie_is_401() {
        let (state, _) = test_state().await;
        let long_ago = Utc::now() - state.tokens.ttl(TokenKind::Refresh) - Duration::seconds(10);
        let expired = state
            .tokens
            .issue_at("g123", TokenKind::Refresh, long_ago)
            .unwrap();
        let access = state.tokens.issue("g123", TokenKind::Access).unwrap();

        let response = send(
            &state,
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header(
                    header::COOKIE,
                    format!("ACCESS_TOKEN={}; REFRESH_TOKEN={}", access, expired),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(response.headers()).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_with_access_token_in_refresh_cookie_is_401() {
        let (state, _) = test_state().await;
        let access = state.tokens.issue("g123", TokenKind::Access).unwrap();

        let response = send(
            &state,
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header(header::COOKIE, format!("REFRESH_TOKEN={}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(response.headers()).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_rewrites_only_access_cookie() {
        let (state, _) = test_state().await;
        let refresh = state.tokens.issue("g123", TokenKind::Refresh).unwrap();

        let response = send(
            &state,
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header(header::COOKIE, format!("REFRESH_TOKEN={}", refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let written = set_cookies(response.headers());
        assert_eq!(written.len(), 1);

        let access = Cookie::parse(written[0].clone()).unwrap();
        assert_eq!(access.name(), "ACCESS_TOKEN");
        let claims = state.tokens.verify(access.value(), TokenKind::Access).unwrap();
        assert_eq!(claims.subject(), "g123");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_logout_without_cookies_still_clears_both() {
        let (state, _) = test_state().await;

        let response = send(
            &state,
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let written = set_cookies(response.headers());
        assert_eq!(written.len(), 2);
        for (raw, name) in written.iter().zip(["ACCESS_TOKEN", "REFRESH_TOKEN"]) {
            let cleared = Cookie::parse(raw.clone()).unwrap();
            assert_eq!(cleared.name(), name);
            assert_eq!(cleared.value(), "");
            assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
            assert_eq!(cleared.http_only(), Some(true));
            assert_eq!(cleared.path(), Some("/"));
        }
    }

    #[tokio::test]
    async fn test_me_requires_principal() {
        let (state, _) = test_state().await;

        let response = send(
            &state,
            Request::builder()
                .uri("/api/users/me")
                .header(header::COOKIE, "ACCESS_TOKEN=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_resolves_principal_to_identity() {
        let (state, _) = test_state().await;
        let identity = state
            .federator
            .reconcile("google", &google_payload("g123", "a@x.com", "Nurse Kim"))
            .await
            .unwrap();
        let access = state.tokens.issue("g123", TokenKind::Access).unwrap();

        let response = send(
            &state,
            Request::builder()
                .uri("/api/users/me")
                .header(header::COOKIE, format!("ACCESS_TOKEN={}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], identity.id);
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["provider"], "GOOGLE");
        assert_eq!(body["role"], "USER");
        assert!(body.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_me_for_unknown_subject_is_404() {
        let (state, _) = test_state().await;
        let access = state.tokens.issue("ghost", TokenKind::Access).unwrap();

        let response = send(
            &state,
            Request::builder()
                .uri("/api/users/me")
                .header(header::COOKIE, format!("ACCESS_TOKEN={}", access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_route_reachable_with_garbage_cookie() {
        let (state, _) = test_state().await;

        let response = send(
            &state,
            Request::builder()
                .uri("/health")
                .header(header::COOKIE, "ACCESS_TOKEN=not.a.jwt; REFRESH_TOKEN=%%%")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(response.headers()).is_empty());
    }

    #[tokio::test]
    async fn test_authorize_unknown_provider_redirects_to_failure() {
        let (state, _) = test_state().await;

        let response = send(
            &state,
            Request::builder()
                .uri("/oauth2/authorization/github")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "https://ward.example/login?from=oauth&error=unsupported_provider"
        );
        let written = set_cookies(response.headers());
        assert!(written.iter().any(|c| c.starts_with("ACCESS_TOKEN=;")));
        assert!(written.iter().any(|c| c.starts_with("REFRESH_TOKEN=;")));
    }

    #[tokio::test]
    async fn test_authorize_unconfigured_provider_redirects_to_failure() {
        let (state, _) = test_state().await;

        let response = send(
            &state,
            Request::builder()
                .uri("/oauth2/authorization/kakao")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).ends_with("error=provider_not_configured"));
    }

    #[tokio::test]
    async fn test_authorize_configured_provider_sets_state_cookie() {
        let mut config = test_config();
        config.providers.insert(
            Provider::Google,
            ProviderRegistration::for_provider(
                Provider::Google,
                "client".to_string(),
                "secret".to_string(),
                "http://localhost:8080",
            ),
        );
        let (state, _) = test_state_with(config).await;

        let response = send(
            &state,
            Request::builder()
                .uri("/oauth2/authorization/google")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let written = set_cookies(response.headers());
        assert_eq!(written.len(), 1);
        let state_cookie = Cookie::parse(written[0].clone()).unwrap();
        assert_eq!(state_cookie.name(), "OAUTH2_STATE");
        assert_eq!(state_cookie.http_only(), Some(true));

        let target = location(&response);
        assert!(target.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(target.contains(&format!("state={}", state_cookie.value())));
    }

    #[tokio::test]
    async fn test_callback_with_provider_error_redirects_to_failure() {
        let (state, _) = test_state().await;

        let response = send(
            &state,
            Request::builder()
                .uri("/login/oauth2/code/google?error=access_denied")
                .header(header::COOKIE, "ACCESS_TOKEN=stale; REFRESH_TOKEN=stale")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).ends_with("error=access_denied"));
        let written = set_cookies(response.headers());
        assert!(written.iter().any(|c| c.starts_with("ACCESS_TOKEN=;")));
        assert!(written.iter().any(|c| c.starts_with("REFRESH_TOKEN=;")));
    }

    #[tokio::test]
    async fn test_callback_with_mismatched_state_is_rejected() {
        let (state, _) = test_state().await;

        let response = send(
            &state,
            Request::builder()
                .uri("/login/oauth2/code/google?code=abc&state=forged")
                .header(header::COOKIE, "OAUTH2_STATE=expected")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).ends_with("error=invalid_state"));
    }

    #[tokio::test]
    async fn test_email_login_sets_session_cookies() {
        let (state, notifier) = test_state().await;
        state
            .email_auth
            .check_email_duplicate("doc@ward.example")
            .await
            .unwrap();
        state
            .email_auth
            .verify_code("doc@ward.example", &notifier.last_code())
            .await
            .unwrap();
        state
            .email_auth
            .complete_signup("doc@ward.example", "password123")
            .await
            .unwrap();

        let response = send(
            &state,
            Request::builder()
                .method("POST")
                .uri("/auth/email/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "email": "doc@ward.example", "password": "password123" }).to_string(),
                ))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let written = set_cookies(response.headers());
        assert_eq!(written.len(), 2);
        let access = Cookie::parse(written[0].clone()).unwrap();
        let claims = state.tokens.verify(access.value(), TokenKind::Access).unwrap();
        assert_eq!(claims.subject(), "doc@ward.example");

        let body = body_json(response).await;
        assert_eq!(body["email"], "doc@ward.example");
        assert_eq!(body["provider"], "LOCAL");
        assert!(!body.to_string().contains(access.value()));
    }

    #[tokio::test]
    async fn test_email_check_rejects_malformed_address() {
        let (state, notifier) = test_state().await;

        let response = send(
            &state,
            Request::builder()
                .uri("/auth/email/check?email=not-an-email")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(notifier.codes().is_empty());
    }
}
