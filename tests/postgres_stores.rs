//! Postgres store tests. They need a running database reachable with the
//! settings in `configuration.yaml`; run with `cargo test -- --ignored`.

use std::sync::Arc;

use authgate::auth::{generate_refresh_token, hash_token, RefreshTokenManager, Role};
use authgate::configuration::{get_configuration, DatabaseSettings, SessionSettings};
use authgate::error::{AppError, AuthError, DatabaseError};
use authgate::store::{CredentialStore, NewUser, PgCredentialStore, PgSessionStore, SessionStore};
use chrono::{Duration, Utc};
use sqlx::{Connection, Executor, PgConnection, PgPool};

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn fresh_pool() -> PgPool {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    configure_database(&configuration.database).await
}

fn new_user(username: &str, email: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: "$2b$04$placeholderplaceholderplaceholderplaceholderpl".to_string(),
        role: Role::User,
    }
}

#[tokio::test]
#[ignore]
async fn credential_store_enforces_case_insensitive_uniqueness() {
    let store = PgCredentialStore::new(fresh_pool().await);

    let user = store.create_user(new_user("alice", "alice@x.com")).await.unwrap();
    assert_eq!(user.role, Role::User);
    assert!(user.last_login.is_none());

    assert!(matches!(
        store.create_user(new_user("bob", "ALICE@x.com")).await,
        Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
    ));
    assert!(matches!(
        store.create_user(new_user("Alice", "other@x.com")).await,
        Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
    ));

    let found = store.find_user_by_email("Alice@X.com").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);

    store.update_last_login(user.id, Utc::now()).await.unwrap();
    let reloaded = store.find_user_by_id(user.id).await.unwrap().unwrap();
    assert!(reloaded.last_login.is_some());
}

#[tokio::test]
#[ignore]
async fn session_store_rotates_revokes_and_purges() {
    let pool = fresh_pool().await;
    let credentials = PgCredentialStore::new(pool.clone());
    let sessions = Arc::new(PgSessionStore::new(pool));
    let manager = RefreshTokenManager::new(sessions.clone(), &SessionSettings::default());

    let user = credentials
        .create_user(new_user("alice", "alice@x.com"))
        .await
        .unwrap();

    let issued = manager.issue(user.id).await.unwrap();
    let record = sessions.find(&hash_token(&issued.token)).await.unwrap().unwrap();
    assert_eq!(record.user_id, user.id);
    assert!(!record.revoked);

    let (owner, rotated) = manager.rotate(&issued.token).await.unwrap();
    assert_eq!(owner, user.id);
    assert!(matches!(
        manager.rotate(&issued.token).await,
        Err(AppError::Auth(AuthError::TokenInvalid))
    ));

    manager.revoke(&rotated.token).await.unwrap();
    manager.revoke(&rotated.token).await.unwrap();
    assert!(manager.rotate(&rotated.token).await.is_err());

    let stale = generate_refresh_token();
    manager
        .save(user.id, &stale, Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert!(matches!(
        manager.rotate(&stale).await,
        Err(AppError::Auth(AuthError::TokenExpired))
    ));
    assert_eq!(manager.purge_expired().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_rotation_has_a_single_winner() {
    let pool = fresh_pool().await;
    let credentials = PgCredentialStore::new(pool.clone());
    let manager = RefreshTokenManager::new(
        Arc::new(PgSessionStore::new(pool)),
        &SessionSettings::default(),
    );
    let user = credentials
        .create_user(new_user("alice", "alice@x.com"))
        .await
        .unwrap();
    let issued = manager.issue(user.id).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let token = issued.token.clone();
            tokio::spawn(async move { manager.rotate(&token).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
