//! PostgreSQL-backed store.
//!
//! Refresh-token rotation runs in one transaction: the old row is locked with
//! `SELECT ... FOR UPDATE` and revoked with an `UPDATE` conditioned on
//! `revoked = FALSE`, so a second rotation of the same token observes the
//! committed revoke. Dropping the transaction before `commit` rolls it back.
//!
//! `register` serializes on a transaction-scoped advisory lock, so the
//! "first user" count and the admin grant commit together.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgExecutor, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RoleStore, SessionStore, UserDirectory};
use crate::auth::AuthError;
use crate::models::page::{Page, PageRequest};
use crate::models::role::{ADMIN_ROLE, Role};
use crate::models::user::{LoginEvent, NewUser, User, UserId, UserPatch, UserWithPassword};

type UserRow = (
    Uuid,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<NaiveDate>,
    DateTime<Utc>,
);

/// A [`UserRow`] followed by `password_hash`.
type UserWithHashRow = (
    Uuid,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<NaiveDate>,
    DateTime<Utc>,
    String,
);

const USER_COLUMNS: &str = "id, login, first_name, last_name, email, birthdate, created_at";

/// Advisory lock key held by `register` for the rest of its transaction.
const REGISTER_LOCK_KEY: i64 = 0x6761_7465_6875_7365;

fn user_from_row(row: UserRow) -> User {
    let (id, login, first_name, last_name, email, birthdate, created_at) = row;
    User {
        id,
        login,
        first_name,
        last_name,
        email,
        birthdate,
        created_at,
    }
}

async fn insert_user<'e, E>(executor: E, user: &NewUser) -> Result<User, AuthError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (id, login, password_hash, first_name, last_name, email, birthdate) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&user.login)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(user.birthdate)
    .fetch_one(executor)
    .await
    .map_err(|e| conflict_on_unique(e, "user with this login already exists"))?;
    Ok(user_from_row(row))
}

/// Map a unique-constraint violation to `Conflict(message)`.
fn conflict_on_unique(e: sqlx::Error, message: &str) -> AuthError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AuthError::Conflict(message.to_string())
        }
        _ => AuthError::DbError(e),
    }
}

fn limit_offset(page: PageRequest) -> (i64, i64) {
    (
        i64::try_from(page.limit()).unwrap_or(i64::MAX),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_user(&self, id: UserId) -> Result<(), AuthError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(())
        } else {
            Err(AuthError::NotFound("User not found".into()))
        }
    }

    async fn role(&self, id: Uuid) -> Result<Role, AuthError> {
        let row = sqlx::query_as::<_, (Uuid, String)>("SELECT id, title FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(id, title)| Role { id, title })
            .ok_or_else(|| AuthError::NotFound("Role not found".into()))
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create(
        &self,
        subject: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, token_hash, user_id, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::now_v7())
        .bind(token_hash)
        .bind(subject)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "refresh token already exists"))?;
        Ok(())
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UserId, AuthError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, bool)>(
            "SELECT user_id, expires_at, revoked FROM refresh_tokens \
             WHERE token_hash = $1 FOR UPDATE",
        )
        .bind(old_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let (subject, expires_at, revoked) = row.ok_or(AuthError::TokenInvalid)?;
        if expires_at <= now {
            return Err(AuthError::TokenExpired);
        }
        if revoked {
            return Err(AuthError::TokenInvalid);
        }

        let updated = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = $2 \
             WHERE token_hash = $1 AND revoked = FALSE",
        )
        .bind(old_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(AuthError::TokenInvalid);
        }

        sqlx::query(
            "INSERT INTO refresh_tokens (id, token_hash, user_id, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::now_v7())
        .bind(new_hash)
        .bind(subject)
        .bind(new_expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "refresh token already exists"))?;

        tx.commit().await?;
        Ok(subject)
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = now() \
             WHERE token_hash = $1 AND revoked = FALSE",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_except(
        &self,
        subject: UserId,
        except_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, (Uuid, DateTime<Utc>, bool)>(
            "SELECT user_id, expires_at, revoked FROM refresh_tokens \
             WHERE token_hash = $1 FOR UPDATE",
        )
        .bind(except_hash)
        .fetch_optional(&mut *tx)
        .await?;
        match current {
            Some((owner, _, revoked)) if owner != subject || revoked => {
                return Err(AuthError::TokenInvalid);
            }
            Some((_, expires_at, _)) if expires_at <= now => return Err(AuthError::TokenExpired),
            Some(_) => {}
            None => return Err(AuthError::TokenInvalid),
        }

        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = $3 \
             WHERE user_id = $1 AND token_hash <> $2 AND revoked = FALSE",
        )
        .bind(subject)
        .bind(except_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(user_id = %subject, revoked = result.rows_affected(), "revoked sessions");
        Ok(result.rows_affected())
    }

    async fn active_sessions(
        &self,
        subject: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM refresh_tokens \
             WHERE user_id = $1 AND revoked = FALSE AND expires_at > $2",
        )
        .bind(subject)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AuthError> {
        insert_user(&self.pool, &user).await
    }

    async fn register(&self, user: NewUser) -> Result<(User, bool), AuthError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(REGISTER_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;
        let user = insert_user(&mut *tx, &user).await?;

        let granted = if existing == 0 {
            let assigned = sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) \
                 SELECT $1, id FROM roles WHERE title = $2",
            )
            .bind(user.id)
            .bind(ADMIN_ROLE)
            .execute(&mut *tx)
            .await?;
            if assigned.rows_affected() == 0 {
                warn!(user_id = %user.id, "admin role missing, first user left without it");
            }
            assigned.rows_affected() == 1
        } else {
            false
        };

        tx.commit().await?;
        Ok((user, granted))
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<UserWithPassword>, AuthError> {
        let row = sqlx::query_as::<_, UserWithHashRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE login = $1"
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(id, login, first_name, last_name, email, birthdate, created_at, password_hash)| {
                UserWithPassword {
                    user: user_from_row((
                        id, login, first_name, last_name, email, birthdate, created_at,
                    )),
                    password_hash,
                }
            },
        ))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET \
               login = COALESCE($2, login), \
               password_hash = COALESCE($3, password_hash), \
               first_name = COALESCE($4, first_name), \
               last_name = COALESCE($5, last_name), \
               email = COALESCE($6, email), \
               birthdate = COALESCE($7, birthdate) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.login)
        .bind(patch.password_hash)
        .bind(patch.first_name)
        .bind(patch.last_name)
        .bind(patch.email)
        .bind(patch.birthdate)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "user with this login already exists"))?;
        row.map(user_from_row)
            .ok_or_else(|| AuthError::NotFound("User not found".into()))
    }

    async fn record_login(
        &self,
        id: UserId,
        event_date: DateTime<Utc>,
        success: bool,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO login_history (id, user_id, event_date, success) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::now_v7())
        .bind(id)
        .bind(event_date)
        .bind(success)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn login_history(
        &self,
        id: UserId,
        page: PageRequest,
    ) -> Result<Page<LoginEvent>, AuthError> {
        let (limit, offset) = limit_offset(page);
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM login_history WHERE user_id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        let rows = sqlx::query_as::<_, (DateTime<Utc>, bool)>(
            "SELECT event_date, success FROM login_history \
             WHERE user_id = $1 \
             ORDER BY event_date DESC, id DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let items = rows
            .into_iter()
            .map(|(event_date, success)| LoginEvent {
                event_date,
                success,
            })
            .collect();
        Ok(Page::new(items, u64::try_from(total).unwrap_or(0), page))
    }
}

#[async_trait]
impl RoleStore for PgStore {
    async fn list_roles(&self, page: PageRequest) -> Result<Page<Role>, AuthError> {
        let (limit, offset) = limit_offset(page);
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, title FROM roles ORDER BY title LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let items = rows
            .into_iter()
            .map(|(id, title)| Role { id, title })
            .collect();
        Ok(Page::new(items, u64::try_from(total).unwrap_or(0), page))
    }

    async fn find_role_by_title(&self, title: &str) -> Result<Option<Role>, AuthError> {
        let row =
            sqlx::query_as::<_, (Uuid, String)>("SELECT id, title FROM roles WHERE title = $1")
                .bind(title)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, title)| Role { id, title }))
    }

    async fn create_role(&self, title: &str) -> Result<Role, AuthError> {
        let (id, title) = sqlx::query_as::<_, (Uuid, String)>(
            "INSERT INTO roles (id, title) VALUES ($1, $2) RETURNING id, title",
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Role with title already exists"))?;
        Ok(Role { id, title })
    }

    async fn update_role(&self, id: Uuid, title: &str) -> Result<Role, AuthError> {
        let row = sqlx::query_as::<_, (Uuid, String)>(
            "UPDATE roles SET title = $2 WHERE id = $1 RETURNING id, title",
        )
        .bind(id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Role with title already exists"))?;
        row.map(|(id, title)| Role { id, title })
            .ok_or_else(|| AuthError::NotFound("Role not found".into()))
    }

    async fn delete_role(&self, id: Uuid) -> Result<Role, AuthError> {
        // user_roles rows go with it via ON DELETE CASCADE.
        let row = sqlx::query_as::<_, (Uuid, String)>(
            "DELETE FROM roles WHERE id = $1 RETURNING id, title",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(id, title)| Role { id, title })
            .ok_or_else(|| AuthError::NotFound("Role not found".into()))
    }

    async fn user_roles(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Role>, AuthError> {
        self.ensure_user(user_id).await?;
        let (limit, offset) = limit_offset(page);
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT r.id, r.title FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 \
             ORDER BY r.title LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let items = rows
            .into_iter()
            .map(|(id, title)| Role { id, title })
            .collect();
        Ok(Page::new(items, u64::try_from(total).unwrap_or(0), page))
    }

    async fn role_titles(&self, user_id: UserId) -> Result<BTreeSet<String>, AuthError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT r.title FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn assign_role(&self, user_id: UserId, role_id: Uuid) -> Result<Role, AuthError> {
        self.ensure_user(user_id).await?;
        let role = self.role(role_id).await?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "user already has this role"))?;
        Ok(role)
    }

    async fn remove_role(&self, user_id: UserId, role_id: Uuid) -> Result<Role, AuthError> {
        self.ensure_user(user_id).await?;
        let role = self.role(role_id).await?;
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("user does not have this role".into()));
        }
        Ok(role)
    }
}
