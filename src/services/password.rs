// src/services/password.rs
//! One-way password hashing behind an opaque hash/verify seam

use crate::auth::AuthError;
use tracing::warn;

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, AuthError>;
    fn verify(&self, plain: &str, hash: &str) -> bool;
}

/// bcrypt with a configurable work factor
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plain: &str) -> Result<String, AuthError> {
        bcrypt::hash(plain, self.cost).map_err(|e| AuthError::PasswordHash(e.to_string()))
    }

    /// A malformed stored hash verifies as false
    fn verify(&self, plain: &str, hash: &str) -> bool {
        match bcrypt::verify(plain, hash) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }
}
