//! Authentication middleware: Bearer token extraction and role checks.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use gatehouse_core::auth::guard::AuthorizationGuard;
use gatehouse_core::models::auth::TokenClaims;
use gatehouse_core::models::role::ADMIN_ROLE;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// Verified claims of the caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub TokenClaims);

fn authenticate(state: &AppState, request: &Request) -> Result<TokenClaims, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    Ok(state.guard.authenticate(header, Utc::now())?)
}

/// Axum middleware: verifies `Authorization: Bearer <token>` and injects
/// `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &request)?;
    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}

/// Like [`require_auth`], and the caller must hold the `admin` role.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &request)?;
    if let Err(e) = AuthorizationGuard::require_role(&claims, ADMIN_ROLE) {
        debug!(user_id = %claims.sub, path = %request.uri().path(), "admin role required");
        return Err(e.into());
    }
    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}
