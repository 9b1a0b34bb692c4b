/// Credential store boundary
///
/// The auth components never talk to a database directly. They go through
/// `CredentialStore`, which every backend implements; each method is a single
/// round-trip that the backend keeps atomic.

mod memory;
mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;

/// Stored login credential. Never holds a plaintext password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: Uuid,
    pub identifier: String,
    pub password_hash: String,
}

/// Refresh token row as persisted. Keyed by the SHA-256 of the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Result of a revoke round-trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// This call moved the row to revoked
    Revoked,
    /// The row was revoked earlier; `revoked_at` was left as it was
    AlreadyRevoked,
}

#[async_trait]
pub trait CredentialStore: Send + Sync + fmt::Debug {
    async fn get_credential_by_identifier(&self, identifier: &str)
        -> Result<Credential, StoreError>;

    /// Fails with `Conflict` if a row with the same `token_hash` exists
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    async fn get_refresh_token(&self, token_hash: &str) -> Result<RefreshTokenRecord, StoreError>;

    /// Set `revoked_at` if unset. `NotFound` if there is no such row.
    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StoreError>;

    /// Revoke every live token of a user, returning how many were revoked
    async fn revoke_all_refresh_tokens(
        &self,
        user_id: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Run one store round-trip under a deadline
pub(crate) async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Credential store deadline elapsed");
            Err(StoreError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let result = with_deadline(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_deadline_elapses() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;

        assert_eq!(result, Err(StoreError::Timeout));
    }
}
