//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /auth/refresh` - Reissue the access cookie from the refresh cookie
/// - `POST /auth/logout` - Clear both session cookies
/// - `GET /oauth2/authorization/:provider` - Start an OAuth2 login
/// - `GET /login/oauth2/code/:provider` - OAuth2 provider callback
/// - `GET /auth/email/check` - Duplicate check, sends a verification code
/// - `GET /auth/email/verify-code` - Check a verification code
/// - `GET /auth/email/remaining-time` - Seconds left on the pending code
/// - `POST /auth/email/signup` - Finish a local signup
/// - `POST /auth/email/login` - Local login
/// - `GET /api/users/me` - Current user
/// - `GET /health` - Liveness
pub fn auth_routes() -> Router {
    Router::new()
        .route("/auth/refresh", post(handlers::refresh_handler))
        .route("/auth/logout", post(handlers::logout_handler))
        .route(
            "/oauth2/authorization/:provider",
            get(handlers::oauth2_authorize),
        )
        .route(
            "/login/oauth2/code/:provider",
            get(handlers::oauth2_callback),
        )
        .route("/auth/email/check", get(handlers::check_email_handler))
        .route("/auth/email/verify-code", get(handlers::verify_code_handler))
        .route(
            "/auth/email/remaining-time",
            get(handlers::remaining_time_handler),
        )
        .route("/auth/email/signup", post(handlers::signup_handler))
        .route("/auth/email/login", post(handlers::login_handler))
        .route("/api/users/me", get(handlers::me_handler))
        .route("/health", get(handlers::health_handler))
}
