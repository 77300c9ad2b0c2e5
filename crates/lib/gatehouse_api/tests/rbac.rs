//! Role and ownership enforcement over HTTP.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use common::{app, claims, get, post, send, signup};

fn titles(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|r| r["title"].as_str().expect("title").to_string())
        .collect()
}

#[tokio::test]
async fn roles_require_admin() {
    let app = app();
    let admin = signup(&app, "root").await;
    let user = signup(&app, "alice").await;
    assert!(claims(&admin.access).has_role("admin"));
    assert!(!claims(&user.access).has_role("admin"));

    let (status, body) = get(&app, "/roles", &admin.access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["admin"]);
    assert_eq!(body["page"], 1);
    assert_eq!(body["size"], 50);
    assert_eq!(body["total"], 1);

    let (status, body) = get(&app, "/roles", &user.access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"detail": "Forbidden"}));

    let (status, body) = send(&app, Method::GET, "/roles", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"detail": "Not authenticated"}));
}

#[tokio::test]
async fn users_can_only_read_themselves_unless_admin() {
    let app = app();
    let admin = signup(&app, "root").await;
    let u1 = signup(&app, "alice").await;
    let u2 = signup(&app, "bob").await;

    let (status, body) = get(&app, &format!("/users/{}", u2.id), &u1.access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"detail": "Forbidden"}));

    let (status, body) = get(&app, &format!("/users/{}", u1.id), &u1.access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["login"], "alice");

    let (status, _) = get(&app, &format!("/users/{}", u2.id), &admin.access).await;
    assert_eq!(status, StatusCode::OK);

    let missing = uuid::Uuid::new_v4();
    let (status, _) = get(&app, &format!("/users/{missing}"), &admin.access).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/users/not-a-uuid", &admin.access).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn profile_updates() {
    let app = app();
    signup(&app, "root").await;
    let alice = signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;
    let uri = format!("/users/{}", alice.id);

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&alice.access),
        Some(json!({"first_name": "Alice", "email": "alice@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Alice");
    assert_eq!(body["email"], "alice@example.com");

    let (status, _) = send(&app, Method::PUT, &uri, Some(&alice.access), Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&alice.access),
        Some(json!({"login": "bob"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for login in [" ".to_string(), "x".repeat(65)] {
        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&alice.access),
            Some(json!({ "login": login })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&alice.access),
        Some(json!({"login": format!("  {}  ", "a".repeat(64))})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["login"], "a".repeat(64));
    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&alice.access),
        Some(json!({"login": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&bob.access),
        Some(json!({"first_name": "Mallory"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // New password takes effect.
    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&alice.access),
        Some(json!({"password": "pass2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(
        &app,
        "/auth/login",
        json!({"login": "alice", "password": "pass2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_history_is_paginated_and_owner_only() {
    let app = app();
    signup(&app, "root").await;
    let alice = signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;

    for password in ["wrong", "pass1", "wrong"] {
        post(
            &app,
            "/auth/login",
            json!({"login": "alice", "password": password}),
        )
        .await;
    }

    let uri = format!("/users/{}/login_history", alice.id);
    let (status, body) = get(&app, &format!("{uri}?page=1&size=2"), &alice.access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["items"].as_array().map(Vec::len), Some(2));

    let (status, _) = get(&app, &uri, &bob.access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get(&app, &format!("{uri}?size=abc"), &alice.access).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn role_administration() {
    let app = app();
    let admin = signup(&app, "root").await;
    let alice = signup(&app, "alice").await;
    let bearer = Some(admin.access.as_str());

    let (status, editor) = send(
        &app,
        Method::POST,
        "/roles",
        bearer,
        Some(json!({"title": "editor"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let editor_id = editor["id"].as_str().expect("id").to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        "/roles",
        bearer,
        Some(json!({"title": "editor"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, _) = send(&app, Method::POST, "/roles", bearer, Some(json!({"title": " "}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, roles) = get(&app, "/roles", &admin.access).await;
    let admin_id = roles["items"]
        .as_array()
        .expect("items")
        .iter()
        .find(|r| r["title"] == "admin")
        .and_then(|r| r["id"].as_str())
        .expect("admin role")
        .to_string();

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/roles/{admin_id}"),
        bearer,
        Some(json!({"title": "superuser"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/roles/{admin_id}"),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/roles/{editor_id}"),
        bearer,
        Some(json!({"title": "writer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "writer");

    let user_roles = format!("/users/{}/roles", alice.id);
    let assignment = json!({"role_id": editor_id});
    let (status, _) = send(&app, Method::POST, &user_roles, bearer, Some(assignment.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::POST, &user_roles, bearer, Some(assignment.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = get(&app, &user_roles, &admin.access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["writer"]);

    // Snapshot semantics: the new role shows up after refresh.
    assert!(!claims(&alice.access).has_role("writer"));
    let (status, rotated) = post(
        &app,
        "/auth/refresh",
        json!({"refresh_token": alice.refresh}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(claims(rotated["access_token"].as_str().expect("access")).has_role("writer"));

    let (status, _) = send(&app, Method::DELETE, &user_roles, bearer, Some(assignment.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, &user_roles, bearer, Some(assignment)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/roles/{editor_id}"),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/roles/{editor_id}"),
        bearer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &user_roles, &alice.access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
