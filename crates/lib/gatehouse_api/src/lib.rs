//! # gatehouse_api
//!
//! HTTP API library for Gatehouse.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use gatehouse_core::auth::codec::TokenCodec;
use gatehouse_core::auth::guard::AuthorizationGuard;
use gatehouse_core::auth::service::SessionService;
use gatehouse_core::store::{RoleStore, SessionStore, UserDirectory};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, roles, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    pub sessions: SessionService,
    pub guard: AuthorizationGuard,
    pub users: Arc<dyn UserDirectory>,
    pub roles: Arc<dyn RoleStore>,
}

impl AppState {
    /// Wire the services over one store that implements every storage concern.
    pub fn new<S>(config: ApiConfig, store: Arc<S>) -> Self
    where
        S: SessionStore + UserDirectory + RoleStore + 'static,
    {
        let codec = Arc::new(TokenCodec::new(
            config.jwt_secret.as_bytes(),
            config.auth.clone(),
        ));
        let users: Arc<dyn UserDirectory> = store.clone();
        let roles: Arc<dyn RoleStore> = store.clone();
        let sessions = SessionService::new(codec.clone(), store, users.clone(), roles.clone());
        Self {
            config,
            sessions,
            guard: AuthorizationGuard::new(codec),
            users,
            roles,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/logout/all", post(auth::logout_all_handler));

    // Any authenticated user; handlers enforce self-or-admin
    let protected = Router::new()
        .route(
            "/users/{id}",
            get(users::get_user_handler).put(users::update_user_handler),
        )
        .route(
            "/users/{id}/login_history",
            get(users::login_history_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let admin = Router::new()
        .route(
            "/roles",
            get(roles::list_roles_handler).post(roles::create_role_handler),
        )
        .route(
            "/roles/{id}",
            put(roles::update_role_handler).delete(roles::delete_role_handler),
        )
        .route(
            "/users/{id}/roles",
            get(roles::user_roles_handler)
                .post(roles::assign_role_handler)
                .delete(roles::remove_role_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
