//! Storage contracts and their implementations.
//!
//! Each concern gets its own trait so callers depend only on what they use.
//! [`postgres::PgStore`] and [`memory::MemoryStore`] implement all three.

pub mod memory;
pub mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::page::{Page, PageRequest};
use crate::models::role::Role;
use crate::models::user::{LoginEvent, NewUser, User, UserId, UserPatch, UserWithPassword};

/// Refresh-token persistence.
///
/// Every `token_hash` argument is the SHA-256 digest of a refresh token, never
/// the token itself.
///
/// Ordering caveat: `revoke_all_except` and a concurrent `create` (or
/// `rotate`) for the same subject are not ordered. A session created while a
/// revoke-all is in flight may survive it or be revoked by it, depending on
/// how the two transactions interleave.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert an active record. `Conflict` if `token_hash` already exists.
    async fn create(
        &self,
        subject: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Atomically revoke `old_hash` and activate `new_hash` for the same subject.
    ///
    /// Fails `TokenInvalid` when the old record is absent or already revoked
    /// and `TokenExpired` when it expired at or before `now`. Of several
    /// concurrent calls with the same `old_hash`, exactly one succeeds.
    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UserId, AuthError>;

    /// Revoke one record. Returns whether anything changed; unknown or
    /// already-revoked tokens are not an error.
    async fn revoke(&self, token_hash: &str) -> Result<bool, AuthError>;

    /// Revoke every unrevoked record of `subject` except `except_hash`, in one
    /// transaction. Returns the number of records revoked.
    ///
    /// `except_hash` must be an active record of `subject` at `now`: otherwise
    /// nothing is revoked and the call fails `TokenInvalid` (absent, revoked,
    /// or owned by someone else) or `TokenExpired`.
    async fn revoke_all_except(
        &self,
        subject: UserId,
        except_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError>;

    /// Number of records of `subject` that are active at `now`.
    async fn active_sessions(&self, subject: UserId, now: DateTime<Utc>)
    -> Result<u64, AuthError>;
}

/// User records and the login-history audit sink.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Conflict` if the login is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AuthError>;

    /// Create a user and, if it is the first one ever, grant it the `admin`
    /// role in the same atomic step. Returns whether admin was granted.
    ///
    /// Concurrent calls on an empty directory grant admin to exactly one user.
    async fn register(&self, user: NewUser) -> Result<(User, bool), AuthError>;

    async fn find_by_login(&self, login: &str) -> Result<Option<UserWithPassword>, AuthError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, AuthError>;

    /// `NotFound` if the user does not exist, `Conflict` if a new login is taken.
    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, AuthError>;

    async fn record_login(
        &self,
        id: UserId,
        event_date: DateTime<Utc>,
        success: bool,
    ) -> Result<(), AuthError>;

    /// Newest first.
    async fn login_history(
        &self,
        id: UserId,
        page: PageRequest,
    ) -> Result<Page<LoginEvent>, AuthError>;
}

/// Roles and their assignment to users.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Ordered by title.
    async fn list_roles(&self, page: PageRequest) -> Result<Page<Role>, AuthError>;

    async fn find_role_by_title(&self, title: &str) -> Result<Option<Role>, AuthError>;

    /// `Conflict` if the title is taken.
    async fn create_role(&self, title: &str) -> Result<Role, AuthError>;

    /// `NotFound` / `Conflict`.
    async fn update_role(&self, id: Uuid, title: &str) -> Result<Role, AuthError>;

    /// Removes the role and all its assignments. `NotFound` if absent.
    async fn delete_role(&self, id: Uuid) -> Result<Role, AuthError>;

    /// Roles of one user, ordered by title. `NotFound` if the user is absent.
    async fn user_roles(&self, user_id: UserId, page: PageRequest)
    -> Result<Page<Role>, AuthError>;

    /// Titles of every role the user currently holds.
    async fn role_titles(&self, user_id: UserId) -> Result<BTreeSet<String>, AuthError>;

    /// `NotFound` if user or role is absent, `Conflict` if already assigned.
    async fn assign_role(&self, user_id: UserId, role_id: Uuid) -> Result<Role, AuthError>;

    /// `NotFound` if user or role is absent or the role is not assigned.
    async fn remove_role(&self, user_id: UserId, role_id: Uuid) -> Result<Role, AuthError>;
}
