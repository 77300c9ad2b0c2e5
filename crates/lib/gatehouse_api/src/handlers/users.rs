//! User profile handlers. Callers may act on themselves; admins on anyone.

use axum::Json;
use axum::extract::State;
use gatehouse_core::auth::guard::AuthorizationGuard;
use gatehouse_core::auth::password::hash_password_blocking;
use gatehouse_core::auth::service::{validate_email, validate_login};
use gatehouse_core::models::page::Page;
use gatehouse_core::models::user::{LoginEvent, User, UserId, UserPatch};
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{PageParams, UpdateUserRequest};

async fn load_user(state: &AppState, id: UserId) -> AppResult<User> {
    state
        .users
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// `GET /users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<User>> {
    AuthorizationGuard::require_self_or_admin(&caller.0, id)?;
    Ok(Json(load_user(&state, id).await?))
}

/// `PUT /users/{id}`
pub async fn update_user_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    AuthorizationGuard::require_self_or_admin(&caller.0, id)?;

    let login = body.login.as_deref().map(validate_login).transpose()?;
    if let Some(email) = &body.email {
        validate_email(email)?;
    }
    let password_hash = match body.password {
        Some(p) if p.is_empty() => {
            return Err(AppError::Validation("password must not be empty".into()));
        }
        Some(p) => Some(hash_password_blocking(p, state.config.auth.bcrypt_cost).await?),
        None => None,
    };
    let patch = UserPatch {
        login: login.map(str::to_string),
        password_hash,
        first_name: body.first_name,
        last_name: body.last_name,
        email: body.email,
        birthdate: body.birthdate,
    };
    if patch.is_empty() {
        return Err(AppError::Validation("At least one field required".into()));
    }

    let user = state.users.update_user(id, patch).await?;
    info!(user_id = %id, by = %caller.0.sub, "user updated");
    Ok(Json(user))
}

/// `GET /users/{id}/login_history`: newest first.
pub async fn login_history_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> AppResult<Json<Page<LoginEvent>>> {
    AuthorizationGuard::require_self_or_admin(&caller.0, id)?;
    load_user(&state, id).await?;
    let page = state.users.login_history(id, params.into()).await?;
    Ok(Json(page))
}
