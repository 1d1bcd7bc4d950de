// src/logging_middleware.rs
//! Middleware for logging request and response bodies in debug mode

use axum::body::to_bytes;
use axum::{body::Body, extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::debug;

/// Paths whose bodies can carry credentials
const REDACTED_PREFIXES: [&str; 2] = ["/auth/", "/login/"];

fn is_redacted(path: &str) -> bool {
    REDACTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn render_body(bytes: &[u8]) -> Option<String> {
    let body_str = std::str::from_utf8(bytes).ok()?;
    // Try to parse as JSON for pretty printing
    let rendered = serde_json::from_str::<serde_json::Value>(body_str)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or_else(|| body_str.to_string());
    Some(rendered)
}

/// Logs request and response bodies at debug level. Auth paths log only
/// method, path and status; Set-Cookie values are never logged.
pub async fn log_request_response(request: Request, next: Next) -> Result<Response, StatusCode> {
    let path = request.uri().path().to_string();

    if is_redacted(&path) {
        let method = request.method().clone();
        let response = next.run(request).await;
        debug!(
            method = %method,
            path = %path,
            status = %response.status(),
            "Auth request (bodies not logged)"
        );
        return Ok(response);
    }

    let (parts, body) = request.into_parts();

    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !bytes.is_empty() {
        if let Some(request_body) = render_body(&bytes) {
            debug!(
                method = %parts.method,
                uri = %parts.uri,
                request_body = %request_body,
                "Request"
            );
        }
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();

    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !bytes.is_empty() {
        if let Some(response_body) = render_body(&bytes) {
            debug!(status = %parts.status, response_body = %response_body, "Response");
        }
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}
