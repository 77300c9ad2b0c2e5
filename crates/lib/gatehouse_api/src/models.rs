//! Request and response bodies.

use chrono::NaiveDate;
use gatehouse_core::models::page::PageRequest;
use gatehouse_core::models::user::Registration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use gatehouse_core::models::auth::TokenPair as TokenResponse;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
}

impl From<SignupRequest> for Registration {
    fn from(req: SignupRequest) -> Self {
        Registration {
            login: req.login,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            birthdate: req.birthdate,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// `access_token` may be expired but must belong to the refresh token's user.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Number of sessions this call revoked.
    pub revoked: u64,
}

/// Profile update. At least one field must be present.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleAssignmentRequest {
    pub role_id: Uuid,
}

/// `?page=&size=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        PageRequest::new(params.page, params.size)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
