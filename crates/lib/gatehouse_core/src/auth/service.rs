//! Session lifecycle: signup, login, refresh rotation and logout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::AuthError;
use super::codec::{TokenCodec, hash_refresh_token};
use super::password::{hash_password_blocking, verify_password_blocking};
use crate::models::auth::TokenPair;
use crate::models::user::{NewUser, Registration, User, UserId};
use crate::store::{RoleStore, SessionStore, UserDirectory};

pub const MAX_LOGIN_LEN: usize = 64;

/// Orchestrates the token codec and the stores.
#[derive(Clone)]
pub struct SessionService {
    codec: Arc<TokenCodec>,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    roles: Arc<dyn RoleStore>,
}

impl SessionService {
    pub fn new(
        codec: Arc<TokenCodec>,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        roles: Arc<dyn RoleStore>,
    ) -> Self {
        Self {
            codec,
            sessions,
            users,
            roles,
        }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Create an account and open its first session.
    ///
    /// The very first account gets the `admin` role.
    pub async fn signup(
        &self,
        registration: Registration,
        now: DateTime<Utc>,
    ) -> Result<(User, TokenPair), AuthError> {
        let login = validate_registration(&registration)?.to_string();

        let password_hash =
            hash_password_blocking(registration.password, self.codec.settings().bcrypt_cost)
                .await?;
        let (user, admin) = self
            .users
            .register(NewUser {
                login,
                password_hash,
                first_name: registration.first_name,
                last_name: registration.last_name,
                email: registration.email,
                birthdate: registration.birthdate,
            })
            .await?;
        info!(user_id = %user.id, login = %user.login, "user registered");
        if admin {
            info!(user_id = %user.id, "first user granted admin role");
        }

        let pair = self.issue_pair(user.id, now).await?;
        Ok((user, pair))
    }

    /// Verify credentials and open a new session.
    ///
    /// Unknown logins fail `NotFound`, wrong passwords `InvalidCredentials`.
    /// Every attempt against a known account is recorded in the login history.
    pub async fn login(
        &self,
        login: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let Some(found) = self.users.find_by_login(login).await? else {
            info!(login = %login, "login attempt for unknown user");
            return Err(AuthError::NotFound("User not found".into()));
        };
        let user_id = found.user.id;

        let ok = verify_password_blocking(password.to_string(), found.password_hash).await?;
        self.record_login(user_id, now, ok).await;
        if !ok {
            warn!(user_id = %user_id, "login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.issue_pair(user_id, now).await?;
        info!(user_id = %user_id, "user logged in");
        Ok(pair)
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// When `access_token` is given it must be signed by us and belong to the
    /// same subject; its expiry is ignored. A revoked or unknown refresh token
    /// fails `Forbidden`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        access_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let subject = self.codec.verify_refresh_shape(refresh_token)?;
        if let Some(access) = access_token {
            let claims = self.codec.decode_access_ignoring_expiry(access)?;
            if claims.sub != subject {
                warn!(user_id = %subject, "refresh with access token of another subject");
                return Err(AuthError::TokenInvalid);
            }
        }

        let issued = self.codec.issue_refresh(subject, now)?;
        let rotated = self
            .sessions
            .rotate(
                &hash_refresh_token(refresh_token),
                &hash_refresh_token(&issued.value),
                issued.expires_at,
                now,
            )
            .await;
        let user_id = match rotated {
            Ok(user_id) => user_id,
            Err(AuthError::TokenInvalid) => {
                warn!(user_id = %subject, "refresh with revoked or unknown token");
                return Err(AuthError::Forbidden);
            }
            Err(e) => return Err(e),
        };

        let roles = self.roles.role_titles(user_id).await?;
        let access_token = self.codec.issue_access(user_id, &roles, now)?;
        debug!(user_id = %user_id, "refresh token rotated");
        Ok(TokenPair {
            access_token,
            refresh_token: issued.value,
        })
    }

    /// Revoke the session of one refresh token. Returns whether it was active.
    pub async fn logout(&self, refresh_token: &str) -> Result<bool, AuthError> {
        let subject = self.codec.verify_refresh_shape(refresh_token)?;
        let revoked = self
            .sessions
            .revoke(&hash_refresh_token(refresh_token))
            .await?;
        info!(user_id = %subject, revoked, "logout");
        Ok(revoked)
    }

    /// Revoke every other session of the token's subject, keeping this one.
    ///
    /// Unlike [`logout`](Self::logout) this needs a live session: a rotated,
    /// revoked or expired refresh token fails and revokes nothing.
    pub async fn logout_all(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let subject = self.codec.verify_refresh_shape(refresh_token)?;
        let count = self
            .sessions
            .revoke_all_except(subject, &hash_refresh_token(refresh_token), now)
            .await
            .inspect_err(|e| {
                warn!(user_id = %subject, error = %e, "logout from all devices refused");
            })?;
        info!(user_id = %subject, count, "logout from all other devices");
        Ok(count)
    }

    async fn issue_pair(&self, user_id: UserId, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let roles = self.roles.role_titles(user_id).await?;
        let access_token = self.codec.issue_access(user_id, &roles, now)?;
        let issued = self.codec.issue_refresh(user_id, now)?;
        self.sessions
            .create(user_id, &hash_refresh_token(&issued.value), issued.expires_at)
            .await?;
        Ok(TokenPair {
            access_token,
            refresh_token: issued.value,
        })
    }

    async fn record_login(&self, user_id: UserId, now: DateTime<Utc>, success: bool) {
        if let Err(e) = self.users.record_login(user_id, now, success).await {
            warn!(user_id = %user_id, error = %e, "failed to record login event");
        }
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

/// Returns the trimmed login.
fn validate_registration(registration: &Registration) -> Result<&str, AuthError> {
    let login = validate_login(&registration.login)?;
    if registration.password.is_empty() {
        return Err(AuthError::ValidationError(
            "password must not be empty".into(),
        ));
    }
    if let Some(email) = &registration.email {
        validate_email(email)?;
    }
    Ok(login)
}

/// Trim a login and check it is non-empty and at most [`MAX_LOGIN_LEN`]
/// characters. Used for signup and for profile updates.
pub fn validate_login(login: &str) -> Result<&str, AuthError> {
    let login = login.trim();
    if login.is_empty() {
        return Err(AuthError::ValidationError("login must not be empty".into()));
    }
    if login.chars().count() > MAX_LOGIN_LEN {
        return Err(AuthError::ValidationError(format!(
            "login must be at most {MAX_LOGIN_LEN} characters"
        )));
    }
    Ok(login)
}

/// Minimal shape check: one `@`, a non-empty local part, a dotted domain.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.contains('@')
    });
    if valid {
        Ok(())
    } else {
        Err(AuthError::ValidationError(format!(
            "invalid email address: {email}"
        )))
    }
}
