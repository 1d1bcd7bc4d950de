//! Per-request authentication gate
//!
//! Reads the access cookie, verifies it and binds the subject as the request
//! [`Principal`]. A missing or invalid cookie leaves the request anonymous;
//! the 401 decision belongs to the handlers that require a principal. The gate
//! never writes cookies and never touches the identity store.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::extractors::Principal;
use super::models::TokenKind;
use crate::common::{safe_token_log, AppState};

pub async fn authentication_gate(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = state.cookies.read_access_cookie(request.headers()) {
        match state.tokens.verify(&token, TokenKind::Access) {
            Ok(claims) => {
                request.extensions_mut().insert(Principal {
                    subject: claims.sub,
                });
            }
            Err(_) => {
                debug!(
                    token = %safe_token_log(&token),
                    path = %request.uri().path(),
                    "Access cookie rejected, continuing anonymously"
                );
            }
        }
    }

    next.run(request).await
}
