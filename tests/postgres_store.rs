//! Needs the Postgres server from `configuration.yaml`; run with
//! `cargo test -- --ignored`.

use chrono::{DateTime, Duration, DurationRound, Utc};
use chirpy_auth::auth::{generate_refresh_token, hash_token};
use chirpy_auth::configuration::{get_configuration, DatabaseSettings};
use chirpy_auth::error::StoreError;
use chirpy_auth::store::{CredentialStore, PgCredentialStore, RefreshTokenRecord, RevokeOutcome};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

pub struct TestStore {
    pub store: PgCredentialStore,
    pub user_id: Uuid,
}

async fn spawn_store() -> TestStore {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;
    let store = PgCredentialStore::new(connection_pool);

    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, hashed_password) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind("john@example.com")
        .bind("$2b$04$not-a-real-hash")
        .execute(store.pool())
        .await
        .expect("Failed to insert user");

    TestStore { store, user_id }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

/// Postgres keeps microseconds
fn now() -> DateTime<Utc> {
    Utc::now()
        .duration_trunc(Duration::microseconds(1))
        .expect("Failed to truncate timestamp")
}

async fn insert_token(app: &TestStore) -> RefreshTokenRecord {
    let issued_at = now();
    let record = RefreshTokenRecord {
        token_hash: hash_token(&generate_refresh_token()),
        user_id: app.user_id,
        issued_at,
        expires_at: issued_at + Duration::days(60),
        revoked_at: None,
    };
    app.store
        .insert_refresh_token(&record)
        .await
        .expect("Failed to insert refresh token");
    record
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn credential_lookup_by_identifier() {
    let app = spawn_store().await;

    let credential = app
        .store
        .get_credential_by_identifier("john@example.com")
        .await
        .expect("Credential missing");
    assert_eq!(credential.user_id, app.user_id);

    let missing = app.store.get_credential_by_identifier("nobody@example.com").await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn refresh_token_row_round_trips() {
    let app = spawn_store().await;
    let record = insert_token(&app).await;

    let fetched = app
        .store
        .get_refresh_token(&record.token_hash)
        .await
        .expect("Token row missing");

    assert_eq!(fetched, record);
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn duplicate_token_hash_is_a_conflict() {
    let app = spawn_store().await;
    let record = insert_token(&app).await;

    let result = app.store.insert_refresh_token(&record).await;

    assert!(matches!(result, Err(StoreError::Conflict(_))));
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn revoke_happens_once_and_keeps_first_timestamp() {
    let app = spawn_store().await;
    let record = insert_token(&app).await;
    let first = now();

    let outcome = app
        .store
        .revoke_refresh_token(&record.token_hash, first)
        .await
        .expect("Failed to revoke");
    assert_eq!(outcome, RevokeOutcome::Revoked);

    let outcome = app
        .store
        .revoke_refresh_token(&record.token_hash, first + Duration::minutes(5))
        .await
        .expect("Failed to revoke");
    assert_eq!(outcome, RevokeOutcome::AlreadyRevoked);

    let row = app
        .store
        .get_refresh_token(&record.token_hash)
        .await
        .expect("Token row missing");
    assert_eq!(row.revoked_at, Some(first));
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn revoking_unknown_token_is_not_found() {
    let app = spawn_store().await;

    let result = app
        .store
        .revoke_refresh_token(&hash_token("never-issued"), now())
        .await;

    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn concurrent_revokes_have_one_winner() {
    let app = spawn_store().await;
    let record = insert_token(&app).await;

    let (a, b) = tokio::join!(
        app.store.revoke_refresh_token(&record.token_hash, now()),
        app.store.revoke_refresh_token(&record.token_hash, now())
    );

    let revoked = [a, b]
        .into_iter()
        .filter(|outcome| matches!(outcome, Ok(RevokeOutcome::Revoked)))
        .count();
    assert_eq!(revoked, 1);
}

#[tokio::test]
#[ignore = "needs Postgres"]
async fn revoke_all_skips_already_revoked_rows() {
    let app = spawn_store().await;
    let first = insert_token(&app).await;
    let second = insert_token(&app).await;
    let third = insert_token(&app).await;
    let earlier = now();
    app.store
        .revoke_refresh_token(&first.token_hash, earlier)
        .await
        .expect("Failed to revoke");

    let revoked = app
        .store
        .revoke_all_refresh_tokens(app.user_id, earlier + Duration::minutes(1))
        .await
        .expect("Failed to revoke all");
    assert_eq!(revoked, 2);

    let row = app
        .store
        .get_refresh_token(&first.token_hash)
        .await
        .expect("Token row missing");
    assert_eq!(row.revoked_at, Some(earlier));
    for record in [second, third] {
        let row = app
            .store
            .get_refresh_token(&record.token_hash)
            .await
            .expect("Token row missing");
        assert!(row.revoked_at.is_some());
    }

    let none_left = app
        .store
        .revoke_all_refresh_tokens(app.user_id, now())
        .await
        .expect("Failed to revoke all");
    assert_eq!(none_left, 0);
}
