// src/common/id_generator.rs
//! Crockford Base32 ID Generator
//!
//! Generates human-readable, prefixed IDs using Crockford Base32 encoding.
//! Format: PREFIX_XXXXXXXXXX (e.g., U_K7NP3XQ2MW for identities)

use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Identity and verification ids carry 50 bits of randomness.
const ENTITY_ID_LENGTH: usize = 10;

/// Entity type prefixes for ID generation
#[derive(Debug, Clone, Copy)]
pub enum EntityPrefix {
    /// Identity / user record (U_)
    User,
    /// Email verification code row (EV_)
    Verification,
}

impl EntityPrefix {
    /// Get the string prefix for this entity type
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::User => "U",
            EntityPrefix::Verification => "EV",
        }
    }
}

/// Generate a random Crockford Base32 string of specified length
fn generate_crockford_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..32);
            CROCKFORD_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a prefixed ID with custom length
///
/// # Example
/// ```
/// let id = generate_id_with_length(EntityPrefix::User, 10);
/// // Returns something like "U_K7NP3XY2QA"
/// ```
pub fn generate_id_with_length(prefix: EntityPrefix, length: usize) -> String {
    format!("{}_{}", prefix.as_str(), generate_crockford_string(length))
}

/// Generate a raw Crockford Base32 string without prefix
/// Used for the OAuth2 state nonce
pub fn generate_raw_id(length: usize) -> String {
    generate_crockford_string(length)
}

/// Generate a User ID (U_XXXXXXXXXX)
pub fn generate_user_id() -> String {
    generate_id_with_length(EntityPrefix::User, ENTITY_ID_LENGTH)
}

/// Generate an Email Verification ID (EV_XXXXXXXXXX)
pub fn generate_verification_id() -> String {
    generate_id_with_length(EntityPrefix::Verification, ENTITY_ID_LENGTH)
}
