// src/auth/validators.rs

use regex::Regex;
use std::sync::OnceLock;

use super::models::{EmailCredentials, EmailQuery, VerifyCodeQuery};
use crate::common::{ValidationResult, Validator};

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 72;

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").ok())
        .as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_pattern().is_some_and(|re| re.is_match(email))
}

fn check_email(result: &mut ValidationResult, email: &str) {
    if email.trim().is_empty() {
        result.add_error("email", "Email is required");
    } else if !is_valid_email(email.trim()) {
        result.add_error("email", "Email format is invalid");
    }
}

pub struct EmailAuthValidator;

impl Validator<EmailQuery> for EmailAuthValidator {
    fn validate(&self, data: &EmailQuery) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, &data.email);
        result
    }
}

impl Validator<VerifyCodeQuery> for EmailAuthValidator {
    fn validate(&self, data: &VerifyCodeQuery) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, &data.email);

        let code = data.code.trim();
        if code.len() != 4 || !code.chars().all(|c| c.is_ascii_digit()) {
            result.add_error("code", "Verification code must be 4 digits");
        }

        result
    }
}

impl Validator<EmailCredentials> for EmailAuthValidator {
    fn validate(&self, data: &EmailCredentials) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, &data.email);

        if data.password.len() < MIN_PASSWORD_LENGTH {
            result.add_error("password", "Password must be at least 8 characters");
        } else if data.password.len() > MAX_PASSWORD_LENGTH {
            // bcrypt only reads the first 72 bytes
            result.add_error("password", "Password must be at most 72 bytes");
        }

        result
    }
}
