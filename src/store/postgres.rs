/// Postgres credential store
///
/// Expects the schema from `migrations/`: a `users` table holding the
/// bcrypt hash and a `refresh_tokens` table keyed by token hash.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Credential, CredentialStore, RefreshTokenRecord, RevokeOutcome};
use crate::configuration::DatabaseSettings;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against the configured database
    ///
    /// # Errors
    /// Returns a store error if the first connection cannot be made
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        tracing::info!(host = %settings.host, database = %settings.database_name, "Connecting credential store");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&settings.connection_string())
            .await
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                StoreError::from(e)
            })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_credential_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Credential, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("credential".to_string()))?;

        let (user_id, identifier, password_hash) = row;
        Ok(Credential {
            user_id,
            identifier,
            password_hash,
        })
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, user_id, created_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_refresh_token(&self, token_hash: &str) -> Result<RefreshTokenRecord, StoreError> {
        let row = sqlx::query_as::<_, (String, Uuid, DateTime<Utc>, DateTime<Utc>, Option<DateTime<Utc>>)>(
            r#"
            SELECT token_hash, user_id, created_at, expires_at, revoked_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("refresh token".to_string()))?;

        let (token_hash, user_id, issued_at, expires_at, revoked_at) = row;
        Ok(RefreshTokenRecord {
            token_hash,
            user_id,
            issued_at,
            expires_at,
            revoked_at,
        })
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StoreError> {
        // The IS NULL guard makes concurrent revokes race safely: exactly
        // one of them sees a row change.
        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1, updated_at = $1
            WHERE token_hash = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(revoked_at)
        .bind(token_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(RevokeOutcome::Revoked);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM refresh_tokens WHERE token_hash = $1)",
        )
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(RevokeOutcome::AlreadyRevoked)
        } else {
            Err(StoreError::NotFound("refresh token".to_string()))
        }
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1, updated_at = $1
            WHERE user_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(revoked_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(revoked)
    }
}
