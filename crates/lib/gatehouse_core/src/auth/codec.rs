//! JWT token generation and verification.
//!
//! Access and refresh tokens are both HS256 JWTs signed with the same secret
//! and told apart by the `typ` claim. Nothing here touches storage: verifying
//! an access token is pure CPU work.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{AuthError, AuthSettings};
use crate::models::auth::{IssuedRefresh, RefreshClaims, TokenClaims, TokenKind};
use crate::models::user::UserId;

/// Length of the random `jti` nonce in refresh tokens.
const REFRESH_NONCE_LEN: usize = 32;

/// Signs and verifies access and refresh tokens.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    settings: AuthSettings,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], settings: AuthSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            settings,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Generate a signed access token expiring `access_ttl` after `now`.
    pub fn issue_access(
        &self,
        subject: UserId,
        roles: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = TokenClaims {
            sub: subject,
            roles: roles.clone(),
            iat: now.timestamp(),
            exp: (now + self.settings.access_ttl).timestamp(),
            typ: TokenKind::Access,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Generate a signed refresh token expiring `refresh_ttl` after `now`.
    pub fn issue_refresh(
        &self,
        subject: UserId,
        now: DateTime<Utc>,
    ) -> Result<IssuedRefresh, AuthError> {
        let expires_at = now + self.settings.refresh_ttl;
        let claims = RefreshClaims {
            sub: subject,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: random_alphanumeric(REFRESH_NONCE_LEN),
            typ: TokenKind::Refresh,
        };
        let value = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok(IssuedRefresh { value, expires_at })
    }

    /// Verify an access token at `now`, returning the claims on success.
    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let claims = self.decode_access_ignoring_expiry(token)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    /// Check signature and shape of an access token without looking at `exp`.
    pub fn decode_access_ignoring_expiry(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims: TokenClaims = self.decode_unexpired_or_not(token)?;
        if claims.typ != TokenKind::Access {
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims)
    }

    /// Check signature and shape of a refresh token, returning its subject.
    ///
    /// Liveness (revoked, expired) is decided by the session store.
    pub fn verify_refresh_shape(&self, token: &str) -> Result<UserId, AuthError> {
        let claims: RefreshClaims = self.decode_unexpired_or_not(token)?;
        if claims.typ != TokenKind::Refresh {
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims.sub)
    }

    fn decode_unexpired_or_not<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        decode::<T>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::TokenInvalid)
    }
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn random_alphanumeric(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret = random_alphanumeric(64);
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gatehouse")
        .join("jwt-secret")
}
