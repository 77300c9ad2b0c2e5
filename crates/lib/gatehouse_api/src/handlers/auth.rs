//! Authentication request handlers.

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::ApiJson;
use crate::models::{
    LoginRequest, LogoutRequest, LogoutResponse, RefreshRequest, SignupRequest, TokenResponse,
};

/// `POST /auth/signup`: create an account and return its first token pair.
pub async fn signup_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignupRequest>,
) -> AppResult<Json<TokenResponse>> {
    let (_, pair) = state.sessions.signup(body.into(), Utc::now()).await?;
    Ok(Json(pair))
}

/// `POST /auth/login`: authenticate with login + password.
pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state
        .sessions
        .login(&body.login, &body.password, Utc::now())
        .await?;
    Ok(Json(pair))
}

/// `POST /auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state
        .sessions
        .refresh(&body.refresh_token, body.access_token.as_deref(), Utc::now())
        .await?;
    Ok(Json(pair))
}

/// `POST /auth/logout`: revoke one refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LogoutRequest>,
) -> AppResult<Json<LogoutResponse>> {
    let revoked = state.sessions.logout(&body.refresh_token).await?;
    Ok(Json(LogoutResponse {
        revoked: u64::from(revoked),
    }))
}

/// `POST /auth/logout/all`: revoke every other session of the token's user.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LogoutRequest>,
) -> AppResult<Json<LogoutResponse>> {
    let revoked = state
        .sessions
        .logout_all(&body.refresh_token, Utc::now())
        .await?;
    Ok(Json(LogoutResponse { revoked }))
}
