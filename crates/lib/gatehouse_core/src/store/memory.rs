//! In-process store backed by `DashMap`s.
//!
//! Used by tests and by `gatehouse_server --storage memory`. Compare-and-swap
//! on a refresh token happens while holding the shard write guard returned by
//! `get_mut`, so concurrent rotations of one token serialize on that guard.
//! No code path holds guards on two keys of one map at once: shard locks are
//! not reentrant.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RoleStore, SessionStore, UserDirectory};
use crate::auth::AuthError;
use crate::models::auth::RefreshTokenRecord;
use crate::models::page::{Page, PageRequest};
use crate::models::role::{ADMIN_ROLE, Role};
use crate::models::user::{LoginEvent, NewUser, User, UserId, UserPatch, UserWithPassword};

#[derive(Debug)]
pub struct MemoryStore {
    users: DashMap<UserId, UserWithPassword>,
    logins: DashMap<String, UserId>,
    roles: DashMap<Uuid, Role>,
    role_titles: DashMap<String, Uuid>,
    user_roles: DashMap<UserId, BTreeSet<Uuid>>,
    tokens: DashMap<String, RefreshTokenRecord>,
    history: DashMap<UserId, Vec<LoginEvent>>,
    /// Serializes user creation so "first user" is decided exactly once.
    signup: Mutex<()>,
}

impl MemoryStore {
    /// Empty store with the built-in `admin` role seeded.
    pub fn new() -> Self {
        let store = Self {
            users: DashMap::new(),
            logins: DashMap::new(),
            roles: DashMap::new(),
            role_titles: DashMap::new(),
            user_roles: DashMap::new(),
            tokens: DashMap::new(),
            history: DashMap::new(),
            signup: Mutex::new(()),
        };
        let admin = Role {
            id: Uuid::new_v4(),
            title: ADMIN_ROLE.to_string(),
        };
        store.role_titles.insert(admin.title.clone(), admin.id);
        store.roles.insert(admin.id, admin);
        store
    }

    fn ensure_user(&self, id: UserId) -> Result<(), AuthError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(AuthError::NotFound("User not found".into()))
        }
    }

    fn role(&self, id: Uuid) -> Result<Role, AuthError> {
        self.roles
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| AuthError::NotFound("Role not found".into()))
    }

    fn insert_user(&self, user: NewUser) -> Result<User, AuthError> {
        let id = Uuid::new_v4();
        match self.logins.entry(user.login.clone()) {
            Entry::Occupied(_) => {
                return Err(AuthError::Conflict(
                    "user with this login already exists".into(),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        let record = User {
            id,
            login: user.login,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            birthdate: user.birthdate,
            created_at: Utc::now(),
        };
        self.users.insert(
            id,
            UserWithPassword {
                user: record.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(record)
    }

    fn roles_of(&self, user_id: UserId) -> Vec<Role> {
        let ids = self
            .user_roles
            .get(&user_id)
            .map(|set| set.clone())
            .unwrap_or_default();
        let mut roles: Vec<Role> = ids
            .iter()
            .filter_map(|id| self.roles.get(id).map(|r| r.clone()))
            .collect();
        roles.sort_by(|a, b| a.title.cmp(&b.title));
        roles
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(
        &self,
        subject: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        match self.tokens.entry(token_hash.to_string()) {
            Entry::Occupied(_) => Err(AuthError::Conflict("refresh token already exists".into())),
            Entry::Vacant(slot) => {
                slot.insert(RefreshTokenRecord {
                    token_hash: token_hash.to_string(),
                    user_id: subject,
                    expires_at,
                    revoked: false,
                    created_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UserId, AuthError> {
        // The new slot is reserved inactive before the old record is claimed;
        // a failed rotation leaves the old record untouched.
        match self.tokens.entry(new_hash.to_string()) {
            Entry::Occupied(_) => {
                return Err(AuthError::Conflict("refresh token already exists".into()));
            }
            Entry::Vacant(slot) => {
                slot.insert(RefreshTokenRecord {
                    token_hash: new_hash.to_string(),
                    user_id: Uuid::nil(),
                    expires_at: new_expires_at,
                    revoked: true,
                    created_at: Utc::now(),
                });
            }
        }

        let claimed = match self.tokens.get_mut(old_hash) {
            None => Err(AuthError::TokenInvalid),
            Some(record) if record.expires_at <= now => Err(AuthError::TokenExpired),
            Some(record) if record.revoked => Err(AuthError::TokenInvalid),
            Some(mut record) => {
                record.revoked = true;
                Ok(record.user_id)
            }
        };
        let subject = match claimed {
            Ok(subject) => subject,
            Err(e) => {
                self.tokens.remove(new_hash);
                return Err(e);
            }
        };

        if let Some(mut record) = self.tokens.get_mut(new_hash) {
            record.user_id = subject;
            record.revoked = false;
        }
        Ok(subject)
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool, AuthError> {
        Ok(match self.tokens.get_mut(token_hash) {
            Some(mut record) if !record.revoked => {
                record.revoked = true;
                true
            }
            _ => false,
        })
    }

    async fn revoke_all_except(
        &self,
        subject: UserId,
        except_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let current = match self.tokens.get(except_hash) {
            None => Err(AuthError::TokenInvalid),
            Some(record) if record.user_id != subject || record.revoked => {
                Err(AuthError::TokenInvalid)
            }
            Some(record) if record.expires_at <= now => Err(AuthError::TokenExpired),
            Some(_) => Ok(()),
        };
        current?;

        let mut revoked = 0;
        for mut record in self.tokens.iter_mut() {
            if record.user_id == subject && !record.revoked && record.token_hash != except_hash {
                record.revoked = true;
                revoked += 1;
            }
        }
        debug!(user_id = %subject, revoked, "revoked sessions");
        Ok(revoked)
    }

    async fn active_sessions(
        &self,
        subject: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        Ok(self
            .tokens
            .iter()
            .filter(|record| record.user_id == subject && record.is_active(now))
            .count() as u64)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AuthError> {
        let _gate = self.signup.lock().await;
        self.insert_user(user)
    }

    async fn register(&self, user: NewUser) -> Result<(User, bool), AuthError> {
        let _gate = self.signup.lock().await;
        let first = self.users.is_empty();
        let user = self.insert_user(user)?;
        if !first {
            return Ok((user, false));
        }
        let Some(admin) = self.role_titles.get(ADMIN_ROLE).map(|id| *id) else {
            warn!(user_id = %user.id, "admin role missing, first user left without it");
            return Ok((user, false));
        };
        self.user_roles.entry(user.id).or_default().insert(admin);
        Ok((user, true))
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<UserWithPassword>, AuthError> {
        let Some(id) = self.logins.get(login).map(|entry| *entry) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, AuthError> {
        Ok(self.users.get(&id).map(|u| u.user.clone()))
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, AuthError> {
        let current_login = self
            .users
            .get(&id)
            .map(|u| u.user.login.clone())
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;

        if let Some(login) = &patch.login
            && *login != current_login
        {
            match self.logins.entry(login.clone()) {
                Entry::Occupied(_) => {
                    return Err(AuthError::Conflict(
                        "user with this login already exists".into(),
                    ));
                }
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
            self.logins.remove(&current_login);
        }

        let mut entry = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        let UserPatch {
            login,
            password_hash,
            first_name,
            last_name,
            email,
            birthdate,
        } = patch;
        if let Some(login) = login {
            entry.user.login = login;
        }
        if let Some(hash) = password_hash {
            entry.password_hash = hash;
        }
        if first_name.is_some() {
            entry.user.first_name = first_name;
        }
        if last_name.is_some() {
            entry.user.last_name = last_name;
        }
        if email.is_some() {
            entry.user.email = email;
        }
        if birthdate.is_some() {
            entry.user.birthdate = birthdate;
        }
        Ok(entry.user.clone())
    }

    async fn record_login(
        &self,
        id: UserId,
        event_date: DateTime<Utc>,
        success: bool,
    ) -> Result<(), AuthError> {
        self.history
            .entry(id)
            .or_default()
            .push(LoginEvent {
                event_date,
                success,
            });
        Ok(())
    }

    async fn login_history(
        &self,
        id: UserId,
        page: PageRequest,
    ) -> Result<Page<LoginEvent>, AuthError> {
        let mut events = self
            .history
            .get(&id)
            .map(|events| events.clone())
            .unwrap_or_default();
        events.reverse();
        events.sort_by(|a, b| b.event_date.cmp(&a.event_date));
        Ok(page.paginate(&events))
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn list_roles(&self, page: PageRequest) -> Result<Page<Role>, AuthError> {
        let mut roles: Vec<Role> = self.roles.iter().map(|r| r.clone()).collect();
        roles.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(page.paginate(&roles))
    }

    async fn find_role_by_title(&self, title: &str) -> Result<Option<Role>, AuthError> {
        let Some(id) = self.role_titles.get(title).map(|entry| *entry) else {
            return Ok(None);
        };
        Ok(self.roles.get(&id).map(|r| r.clone()))
    }

    async fn create_role(&self, title: &str) -> Result<Role, AuthError> {
        let role = Role {
            id: Uuid::new_v4(),
            title: title.to_string(),
        };
        match self.role_titles.entry(role.title.clone()) {
            Entry::Occupied(_) => {
                return Err(AuthError::Conflict("Role with title already exists".into()));
            }
            Entry::Vacant(slot) => {
                slot.insert(role.id);
            }
        }
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update_role(&self, id: Uuid, title: &str) -> Result<Role, AuthError> {
        let current = self.role(id)?.title;
        if current != title {
            match self.role_titles.entry(title.to_string()) {
                Entry::Occupied(_) => {
                    return Err(AuthError::Conflict("Role with title already exists".into()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
            self.role_titles.remove(&current);
        }
        let mut role = self
            .roles
            .get_mut(&id)
            .ok_or_else(|| AuthError::NotFound("Role not found".into()))?;
        role.title = title.to_string();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: Uuid) -> Result<Role, AuthError> {
        let (_, role) = self
            .roles
            .remove(&id)
            .ok_or_else(|| AuthError::NotFound("Role not found".into()))?;
        self.role_titles.remove(&role.title);
        for mut assigned in self.user_roles.iter_mut() {
            assigned.remove(&id);
        }
        Ok(role)
    }

    async fn user_roles(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Role>, AuthError> {
        self.ensure_user(user_id)?;
        Ok(page.paginate(&self.roles_of(user_id)))
    }

    async fn role_titles(&self, user_id: UserId) -> Result<BTreeSet<String>, AuthError> {
        Ok(self
            .roles_of(user_id)
            .into_iter()
            .map(|role| role.title)
            .collect())
    }

    async fn assign_role(&self, user_id: UserId, role_id: Uuid) -> Result<Role, AuthError> {
        self.ensure_user(user_id)?;
        let role = self.role(role_id)?;
        let mut assigned = self.user_roles.entry(user_id).or_default();
        if !assigned.insert(role_id) {
            return Err(AuthError::Conflict("user already has this role".into()));
        }
        Ok(role)
    }

    async fn remove_role(&self, user_id: UserId, role_id: Uuid) -> Result<Role, AuthError> {
        self.ensure_user(user_id)?;
        let role = self.role(role_id)?;
        let removed = self
            .user_roles
            .get_mut(&user_id)
            .map(|mut assigned| assigned.remove(&role_id))
            .unwrap_or(false);
        if !removed {
            return Err(AuthError::NotFound("user does not have this role".into()));
        }
        Ok(role)
    }
}
