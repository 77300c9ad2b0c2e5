//! Authentication and authorization logic.
//!
//! Token signing, password hashing, the authorization guard and the session
//! orchestration shared by `gatehouse_api` and `gatehouse_server`.

pub mod codec;
pub mod guard;
pub mod password;
pub mod service;

use chrono::Duration;
use thiserror::Error;

/// Authentication errors.
///
/// `DbError` and `Internal` are the fatal channel: they surface to clients as
/// a generic 500 and are never used for control flow.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Default access token lifetime: 1 hour.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 60 * 60;

/// Default refresh token lifetime: 10 days.
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 10;

/// Token lifetimes and hashing cost, built once at startup.
#[derive(Clone, Debug)]
pub struct AuthSettings {
    /// Access token lifetime.
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    pub refresh_ttl: Duration,
    /// bcrypt cost factor for new password hashes.
    pub bcrypt_cost: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
            bcrypt_cost: password::DEFAULT_BCRYPT_COST,
        }
    }
}
