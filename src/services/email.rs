// src/services/email.rs
//! Verification-code delivery
//!
//! Delivery is fire-and-forget: callers never wait on it and a failed send is
//! only logged. The user can always ask for a fresh code.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::common::safe_email_log;

pub const VERIFICATION_SUBJECT: &str = "[Ward] Email verification code";

pub trait VerificationNotifier: Send + Sync {
    /// Must return immediately; any I/O happens on a detached task
    fn send_verification_code(&self, email: &str, code: &str);
}

/// Payload handed to the delivery backend
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub fn generate_verification_email(code: &str, valid_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; text-align: center; }}
        .code {{ font-weight: 700; letter-spacing: 5px; font-size: 30px; color: #0ea5e9; }}
        .footer {{ color: #6b7280; font-size: 14px; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Email verification</h2>
        <p>Enter the code below to continue signing up.</p>
        <p class="code">{}</p>
        <p class="footer">This code is valid for {} minutes.</p>
    </div>
</body>
</html>"#,
        code, valid_minutes
    )
}

/// Development notifier: writes the delivery to the log
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

impl VerificationNotifier for LoggingNotifier {
    fn send_verification_code(&self, email: &str, code: &str) {
        info!(
            to = %safe_email_log(email),
            "Verification email queued (logging notifier, no delivery)"
        );
        debug!(to = %safe_email_log(email), code = %code, "Verification code");
    }
}

/// Posts the rendered email as JSON to a mail relay endpoint
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
    valid_minutes: i64,
}

impl WebhookNotifier {
    pub fn new(endpoint: String, valid_minutes: i64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoint,
            valid_minutes,
        }
    }
}

impl VerificationNotifier for WebhookNotifier {
    fn send_verification_code(&self, email: &str, code: &str) {
        let payload = OutboundEmail {
            to: email.to_string(),
            subject: VERIFICATION_SUBJECT.to_string(),
            html: generate_verification_email(code, self.valid_minutes),
        };
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        tokio::spawn(async move {
            let masked = safe_email_log(&payload.to);
            match client.post(&endpoint).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(to = %masked, "Verification email delivered to relay");
                }
                Ok(resp) => {
                    warn!(to = %masked, status = %resp.status(), "Mail relay rejected verification email");
                }
                Err(e) => {
                    warn!(to = %masked, error = %e, "Failed to reach mail relay");
                }
            }
        });
    }
}
