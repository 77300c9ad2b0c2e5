//! PostgreSQL store tests.
//!
//! Run only when `GATEHOUSE_TEST_DATABASE_URL` points at a scratch database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use gatehouse_core::auth::AuthError;
use gatehouse_core::models::user::NewUser;
use gatehouse_core::store::postgres::PgStore;
use gatehouse_core::store::{RoleStore, SessionStore, UserDirectory};
use uuid::Uuid;

async fn store() -> Option<PgStore> {
    let url = std::env::var("GATEHOUSE_TEST_DATABASE_URL").ok()?;
    let pool = gatehouse_core::db::connect(&url, 4)
        .await
        .expect("connect to test database");
    gatehouse_core::migrate::migrate(&pool)
        .await
        .expect("run migrations");
    Some(PgStore::new(pool))
}

fn new_user() -> NewUser {
    NewUser {
        login: format!("pg-{}", Uuid::new_v4()),
        password_hash: "x".into(),
        first_name: None,
        last_name: None,
        email: None,
        birthdate: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rotation_has_exactly_one_winner() {
    let Some(store) = store().await else {
        eprintln!("GATEHOUSE_TEST_DATABASE_URL not set, skipping");
        return;
    };
    let store = Arc::new(store);
    let user = store.create_user(new_user()).await.unwrap();
    let now = Utc::now();
    let old = format!("old-{}", Uuid::new_v4());
    store
        .create(user.id, &old, now + Duration::days(1))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let old = old.clone();
        handles.push(tokio::spawn(async move {
            let new = format!("new-{i}-{}", Uuid::new_v4());
            store.rotate(&old, &new, now + Duration::days(1), now).await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(subject) => {
                assert_eq!(subject, user.id);
                wins += 1;
            }
            Err(AuthError::TokenInvalid) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(store.active_sessions(user.id, now).await.unwrap(), 1);
}

#[tokio::test]
async fn admin_role_is_seeded_and_assignable() {
    let Some(store) = store().await else {
        eprintln!("GATEHOUSE_TEST_DATABASE_URL not set, skipping");
        return;
    };
    let user = store.create_user(new_user()).await.unwrap();
    let admin = store
        .find_role_by_title("admin")
        .await
        .unwrap()
        .expect("admin role seeded");
    store.assign_role(user.id, admin.id).await.unwrap();
    assert!(store.role_titles(user.id).await.unwrap().contains("admin"));
    assert!(matches!(
        store.assign_role(user.id, admin.id).await,
        Err(AuthError::Conflict(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_grant_admin_at_most_once() {
    let Some(store) = store().await else {
        eprintln!("GATEHOUSE_TEST_DATABASE_URL not set, skipping");
        return;
    };
    let store = Arc::new(store);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.register(new_user()).await }));
    }

    let mut granted = 0;
    for handle in handles {
        let (user, admin) = handle.await.unwrap().unwrap();
        if admin {
            granted += 1;
            assert!(store.role_titles(user.id).await.unwrap().contains("admin"));
        }
    }
    // A scratch database that already has users grants nobody.
    assert!(granted <= 1);
}

#[tokio::test]
async fn revoke_all_except_rejects_a_rotated_token() {
    let Some(store) = store().await else {
        eprintln!("GATEHOUSE_TEST_DATABASE_URL not set, skipping");
        return;
    };
    let user = store.create_user(new_user()).await.unwrap();
    let now = Utc::now();
    let later = now + Duration::days(1);
    let [a, b, a2] = ["a", "b", "a2"].map(|p| format!("{p}-{}", Uuid::new_v4()));
    store.create(user.id, &a, later).await.unwrap();
    store.create(user.id, &b, later).await.unwrap();
    store.rotate(&a, &a2, later, now).await.unwrap();

    assert!(matches!(
        store.revoke_all_except(user.id, &a, now).await,
        Err(AuthError::TokenInvalid)
    ));
    assert_eq!(store.active_sessions(user.id, now).await.unwrap(), 2);
    assert_eq!(store.revoke_all_except(user.id, &b, now).await.unwrap(), 1);
    assert_eq!(store.active_sessions(user.id, now).await.unwrap(), 1);
}
