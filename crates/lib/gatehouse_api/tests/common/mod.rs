//! Shared helpers: an in-memory app and a JSON request driver.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, Utc};
use gatehouse_api::config::{ApiConfig, StorageBackend};
use gatehouse_api::{AppState, router};
use gatehouse_core::auth::AuthSettings;
use gatehouse_core::auth::codec::TokenCodec;
use gatehouse_core::models::auth::TokenClaims;
use gatehouse_core::store::memory::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

pub const SECRET: &str = "integration-secret";

fn settings() -> AuthSettings {
    AuthSettings {
        access_ttl: Duration::hours(1),
        refresh_ttl: Duration::days(10),
        bcrypt_cost: 4,
    }
}

pub fn app() -> Router {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("gatehouse_api=debug,gatehouse_core=debug")
        .with_test_writer()
        .try_init();
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: String::new(),
        jwt_secret: SECRET.into(),
        auth: settings(),
        storage: StorageBackend::Memory,
    };
    router(AppState::new(config, Arc::new(MemoryStore::new())))
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("build request");

    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, None, Some(body)).await
}

pub async fn get(app: &Router, uri: &str, bearer: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, Some(bearer), None).await
}

/// A signed-up user and the pair returned by signup.
pub struct Account {
    pub id: Uuid,
    pub access: String,
    pub refresh: String,
}

pub async fn signup(app: &Router, login: &str) -> Account {
    let (status, body) = post(
        app,
        "/auth/signup",
        json!({"login": login, "password": "pass1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "signup {login}: {body}");
    account_from(&body)
}

pub async fn login(app: &Router, login: &str) -> Account {
    let (status, body) = post(
        app,
        "/auth/login",
        json!({"login": login, "password": "pass1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login {login}: {body}");
    account_from(&body)
}

fn account_from(body: &Value) -> Account {
    let access = body["access_token"].as_str().expect("access_token").to_string();
    let refresh = body["refresh_token"]
        .as_str()
        .expect("refresh_token")
        .to_string();
    Account {
        id: claims(&access).sub,
        access,
        refresh,
    }
}

pub fn claims(access: &str) -> TokenClaims {
    TokenCodec::new(SECRET.as_bytes(), settings())
        .verify_access(access, Utc::now())
        .expect("valid access token")
}
