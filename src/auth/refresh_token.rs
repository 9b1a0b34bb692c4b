/// Refresh Token Management
///
/// Handles refresh token generation, storage, validation, revocation and
/// rotation. Refresh tokens are:
/// - 32 random bytes from the OS CSPRNG, hex encoded (256 bits of entropy)
/// - Hashed with SHA-256 before storage (the store never sees plaintext)
/// - Revoked at most once; `revoked_at` is never cleared or moved
/// - Persisted before they are handed out

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError, ConfigError, StoreError};
use crate::store::{with_deadline, CredentialStore, RefreshTokenRecord, RevokeOutcome};

const TOKEN_BYTES: usize = 32;

/// A freshly issued refresh token. The only place the plaintext lives.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("revoked_at", &self.revoked_at)
            .finish()
    }
}

/// Generate a new cryptographically secure refresh token string
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a refresh token using SHA-256
///
/// This is the key rows are stored and looked up under.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn map_not_found(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound(_) => AppError::Auth(AuthError::TokenNotFound),
        other => AppError::Store(other),
    }
}

#[derive(Clone)]
pub struct RefreshTokenManager {
    store: Arc<dyn CredentialStore>,
    lifetime: Duration,
    store_timeout: std::time::Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RefreshTokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTokenManager")
            .field("lifetime", &self.lifetime)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl RefreshTokenManager {
    /// # Errors
    /// Returns `ConfigError` if `settings` fail `AuthSettings::validate`
    pub fn new(store: Arc<dyn CredentialStore>, settings: &AuthSettings) -> Result<Self, ConfigError> {
        Self::with_clock(store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CredentialStore>,
        settings: &AuthSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;

        Ok(Self {
            store,
            lifetime: settings.refresh_token_lifetime(),
            store_timeout: settings.store_timeout(),
            clock,
        })
    }

    /// Issue and persist a refresh token for a user
    ///
    /// # Errors
    /// Returns a store error if the row could not be persisted; no token is
    /// returned in that case.
    #[tracing::instrument(name = "issue_refresh_token", skip(self))]
    pub async fn issue(&self, user_id: Uuid) -> Result<RefreshToken, AppError> {
        let token = generate_refresh_token();
        let issued_at = self.clock.now();
        let record = RefreshTokenRecord {
            token_hash: hash_token(&token),
            user_id,
            issued_at,
            expires_at: issued_at + self.lifetime,
            revoked_at: None,
        };

        with_deadline(self.store_timeout, self.store.insert_refresh_token(&record))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to persist refresh token");
                AppError::Store(e)
            })?;

        tracing::info!(expires_at = %record.expires_at, "Refresh token issued");

        Ok(RefreshToken {
            token,
            user_id,
            issued_at,
            expires_at: record.expires_at,
            revoked_at: None,
        })
    }

    /// Validate a refresh token and return its user
    ///
    /// Checks:
    /// 1. Token exists in the store
    /// 2. Token has not been revoked
    /// 3. Token has not expired
    ///
    /// Revocation and expiry are both evaluated every time; a token that is
    /// both reports `TokenRevoked`.
    ///
    /// # Errors
    /// `TokenNotFound`, `TokenRevoked`, `TokenExpired`, or a store error
    #[tracing::instrument(name = "validate_refresh_token", skip(self, token))]
    pub async fn validate(&self, token: &str) -> Result<Uuid, AppError> {
        let token_hash = hash_token(token);
        let record = with_deadline(self.store_timeout, self.store.get_refresh_token(&token_hash))
            .await
            .map_err(|e| {
                if matches!(e, StoreError::NotFound(_)) {
                    tracing::warn!("Refresh token not found");
                }
                map_not_found(e)
            })?;

        let now = self.clock.now();
        let revoked = record.revoked_at.is_some();
        let expired = now >= record.expires_at;

        if revoked {
            tracing::warn!(user_id = %record.user_id, expired, "Attempt to use revoked refresh token");
            return Err(AuthError::TokenRevoked.into());
        }
        if expired {
            tracing::info!(user_id = %record.user_id, "Refresh token expired");
            return Err(AuthError::TokenExpired.into());
        }

        Ok(record.user_id)
    }

    /// Revoke a single refresh token
    ///
    /// Revoking an already-revoked token succeeds and leaves the original
    /// revocation time in place.
    ///
    /// # Errors
    /// `TokenNotFound` if no such token was ever issued, or a store error
    #[tracing::instrument(name = "revoke_refresh_token", skip(self, token))]
    pub async fn revoke(&self, token: &str) -> Result<(), AppError> {
        self.revoke_by_hash(&hash_token(token)).await.map(|outcome| {
            if outcome == RevokeOutcome::AlreadyRevoked {
                tracing::debug!("Refresh token was already revoked");
            }
        })
    }

    /// Exchange a refresh token for a new one, revoking the old
    ///
    /// The old token is revoked before the replacement is stored, so a
    /// failed insert leaves the caller with no usable refresh token and
    /// they must log in again.
    ///
    /// Only one caller can ever rotate a given token: if another request
    /// revoked it between our validation and revocation, this fails with
    /// `TokenRevoked` and issues nothing.
    ///
    /// # Errors
    /// Anything `validate` returns, `TokenRevoked` when losing a rotation
    /// race, or a store error while issuing the replacement
    #[tracing::instrument(name = "rotate_refresh_token", skip(self, token))]
    pub async fn rotate(&self, token: &str) -> Result<RefreshToken, AppError> {
        let user_id = self.validate(token).await?;

        match self.revoke_by_hash(&hash_token(token)).await? {
            RevokeOutcome::Revoked => {}
            RevokeOutcome::AlreadyRevoked => {
                tracing::warn!(user_id = %user_id, "Refresh token reused during rotation");
                return Err(AuthError::TokenRevoked.into());
            }
        }

        self.issue(user_id).await
    }

    /// Revoke all refresh tokens for a user
    ///
    /// Useful for logout-all-devices functionality.
    #[tracing::instrument(name = "revoke_all_refresh_tokens", skip(self))]
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = with_deadline(
            self.store_timeout,
            self.store.revoke_all_refresh_tokens(user_id, self.clock.now()),
        )
        .await?;

        tracing::info!(revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    async fn revoke_by_hash(&self, token_hash: &str) -> Result<RevokeOutcome, AppError> {
        with_deadline(
            self.store_timeout,
            self.store.revoke_refresh_token(token_hash, self.clock.now()),
        )
        .await
        .map_err(map_not_found)
    }
}
