//! Role administration handlers. Every route here sits behind `require_admin`.

use axum::Json;
use axum::extract::State;
use gatehouse_core::auth::AuthError;
use gatehouse_core::models::page::Page;
use gatehouse_core::models::role::{ADMIN_ROLE, Role};
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{PageParams, RoleAssignmentRequest, RoleRequest};

fn validated_title(body: &RoleRequest) -> AppResult<&str> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    Ok(title)
}

/// Duplicate titles are a client mistake here, reported as 400.
fn title_conflict(e: AuthError) -> AppError {
    match e {
        AuthError::Conflict(msg) => AppError::BadRequest(msg),
        other => other.into(),
    }
}

async fn ensure_not_admin_role(state: &AppState, id: Uuid) -> AppResult<()> {
    if let Some(admin) = state.roles.find_role_by_title(ADMIN_ROLE).await?
        && admin.id == id
    {
        return Err(AppError::BadRequest(
            "The admin role cannot be changed".into(),
        ));
    }
    Ok(())
}

/// `GET /roles`
pub async fn list_roles_handler(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> AppResult<Json<Page<Role>>> {
    Ok(Json(state.roles.list_roles(params.into()).await?))
}

/// `POST /roles`
pub async fn create_role_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    ApiJson(body): ApiJson<RoleRequest>,
) -> AppResult<Json<Role>> {
    let title = validated_title(&body)?;
    let role = state.roles.create_role(title).await.map_err(title_conflict)?;
    info!(role_id = %role.id, title = %role.title, by = %caller.0.sub, "role created");
    Ok(Json(role))
}

/// `PUT /roles/{id}`
pub async fn update_role_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<RoleRequest>,
) -> AppResult<Json<Role>> {
    let title = validated_title(&body)?;
    ensure_not_admin_role(&state, id).await?;
    let role = state
        .roles
        .update_role(id, title)
        .await
        .map_err(title_conflict)?;
    info!(role_id = %id, title = %role.title, by = %caller.0.sub, "role renamed");
    Ok(Json(role))
}

/// `DELETE /roles/{id}`
pub async fn delete_role_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<Role>> {
    ensure_not_admin_role(&state, id).await?;
    let role = state.roles.delete_role(id).await?;
    info!(role_id = %id, title = %role.title, by = %caller.0.sub, "role deleted");
    Ok(Json(role))
}

/// `GET /users/{id}/roles`
pub async fn user_roles_handler(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> AppResult<Json<Page<Role>>> {
    Ok(Json(state.roles.user_roles(user_id, params.into()).await?))
}

/// `POST /users/{id}/roles`
pub async fn assign_role_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<RoleAssignmentRequest>,
) -> AppResult<Json<Role>> {
    let role = state.roles.assign_role(user_id, body.role_id).await?;
    info!(user_id = %user_id, role = %role.title, by = %caller.0.sub, "role assigned");
    Ok(Json(role))
}

/// `DELETE /users/{id}/roles`
pub async fn remove_role_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<RoleAssignmentRequest>,
) -> AppResult<Json<Role>> {
    let role = state.roles.remove_role(user_id, body.role_id).await?;
    info!(user_id = %user_id, role = %role.title, by = %caller.0.sub, "role removed");
    Ok(Json(role))
}
