// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use super::config::AppConfig;
use crate::auth::cookies::CookieTransport;
use crate::auth::email::EmailAuthService;
use crate::auth::federation::IdentityFederator;
use crate::auth::repository::{UserRepository, VerificationRepository};
use crate::auth::session::SessionFlows;
use crate::auth::token::TokenCodec;
use crate::services::{OAuthClient, PasswordHasher, VerificationNotifier};

/// Built once at startup and shared read-only as `Extension<Arc<AppState>>`
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: AppConfig,
    pub tokens: Arc<TokenCodec>,
    pub cookies: Arc<CookieTransport>,
    pub sessions: SessionFlows,
    pub federator: IdentityFederator,
    pub oauth: OAuthClient,
    pub email_auth: EmailAuthService,
    pub users: UserRepository,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: AppConfig,
        notifier: Arc<dyn VerificationNotifier>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let tokens = Arc::new(TokenCodec::new(&config.tokens));
        let cookies = Arc::new(CookieTransport::new(
            config.cookies.clone(),
            config.tokens.access_ttl_secs,
            config.tokens.refresh_ttl_secs,
        ));
        let sessions = SessionFlows::new(tokens.clone(), cookies.clone(), config.redirects.clone());

        let users = UserRepository::new(db.clone());
        let verifications = VerificationRepository::new(db.clone());
        let federator = IdentityFederator::new(users.clone(), config.attribute_mappings.clone());
        let oauth = OAuthClient::new(config.providers.clone());
        let email_auth = EmailAuthService::new(
            db.clone(),
            users.clone(),
            verifications,
            notifier,
            hasher,
        );

        Self {
            db,
            config,
            tokens,
            cookies,
            sessions,
            federator,
            oauth,
            email_auth,
            users,
        }
    }
}
