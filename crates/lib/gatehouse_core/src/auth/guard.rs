//! Bearer-token authentication and role/ownership policy.
//!
//! Only the token codec is consulted, never a store.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::AuthError;
use super::codec::TokenCodec;
use crate::models::auth::TokenClaims;
use crate::models::role::ADMIN_ROLE;
use crate::models::user::UserId;

/// Message returned when no usable credentials were presented.
pub const NOT_AUTHENTICATED: &str = "Not authenticated";

#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    codec: Arc<TokenCodec>,
}

impl AuthorizationGuard {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Verify an `Authorization: Bearer <token>` header value at `now`.
    pub fn authenticate(
        &self,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, AuthError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Unauthenticated(NOT_AUTHENTICATED.into()))?;

        self.codec.verify_access(token, now).map_err(|e| match e {
            AuthError::TokenExpired => AuthError::Unauthenticated("Token expired".into()),
            AuthError::TokenInvalid => AuthError::Unauthenticated("Invalid token".into()),
            other => other,
        })
    }

    pub fn require_role(claims: &TokenClaims, role: &str) -> Result<(), AuthError> {
        if claims.has_role(role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }

    /// Ownership rule for per-user resources: admins, or the user themself.
    pub fn require_self_or_admin(claims: &TokenClaims, target: UserId) -> Result<(), AuthError> {
        if claims.has_role(ADMIN_ROLE) || claims.sub == target {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}
