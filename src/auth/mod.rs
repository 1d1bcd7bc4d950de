//! # Auth Module
//!
//! Identity and session management:
//! - Signed access/refresh tokens carried only in HttpOnly cookies
//! - Google and Kakao OAuth2 logins federated into one identity table
//! - Local email/password signup with one-time verification codes
//! - Request gate binding the token subject as the request principal

pub mod cookies;
pub mod email;
pub mod error;
pub mod extractors;
pub mod federation;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod session;
pub mod token;
pub mod validators;

#[cfg(test)]
mod tests;

pub use error::AuthError;
pub use gate::authentication_gate;
pub use routes::auth_routes;
