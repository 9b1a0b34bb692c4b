/// Session flows
///
/// Composes the password hasher, access-token codec and refresh-token
/// manager into login, refresh and logout. None of those components call
/// each other; this is the only place they meet.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::auth::jwt::AccessTokenCodec;
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::RefreshTokenManager;
use crate::clock::{Clock, SystemClock};
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError, ConfigError, StoreError};
use crate::store::{with_deadline, CredentialStore};

/// Token pair handed to a client after login or refresh
#[derive(Serialize)]
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    access_tokens: AccessTokenCodec,
    refresh_tokens: RefreshTokenManager,
    rotate_refresh_tokens: bool,
    store_timeout: std::time::Duration,
}

impl Authenticator {
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
        Ok(Self {
            hasher: PasswordHasher::from_settings(settings),
            access_tokens: AccessTokenCodec::with_clock(settings, clock.clone())?,
            refresh_tokens: RefreshTokenManager::with_clock(store.clone(), settings, clock)?,
            rotate_refresh_tokens: settings.rotate_refresh_tokens,
            store_timeout: settings.store_timeout(),
            store,
        })
    }

    pub fn access_tokens(&self) -> &AccessTokenCodec {
        &self.access_tokens
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenManager {
        &self.refresh_tokens
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Authenticate with identifier and password
    ///
    /// # Security Notes
    /// - Unknown identifier and wrong password both return
    ///   `CredentialMismatch`, after the same amount of bcrypt work
    /// - The refresh token is persisted before either token is returned
    ///
    /// # Errors
    /// `CredentialMismatch`, or a store error
    #[tracing::instrument(name = "login", skip(self, identifier, password))]
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session, AppError> {
        let lookup = with_deadline(
            self.store_timeout,
            self.store.get_credential_by_identifier(identifier),
        )
        .await;

        let credential = match lookup {
            Ok(credential) => credential,
            Err(StoreError::NotFound(_)) => {
                let err = self
                    .check_password(None, password)
                    .await?
                    .err()
                    .unwrap_or(AuthError::CredentialMismatch);
                tracing::warn!("Login failed: unknown identifier");
                return Err(err.into());
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self
            .check_password(Some(credential.password_hash.clone()), password)
            .await?
        {
            tracing::warn!(user_id = %credential.user_id, "Login failed: password mismatch");
            return Err(e.into());
        }

        let access_token = self.access_tokens.issue(credential.user_id)?;
        let refresh_token = self.refresh_tokens.issue(credential.user_id).await?;

        tracing::info!(user_id = %credential.user_id, "User logged in successfully");

        Ok(self.session(credential.user_id, access_token, refresh_token.token))
    }

    /// Exchange a refresh token for a new access token
    ///
    /// With rotation on (the default) the presented token is revoked and a
    /// new refresh token returned. With rotation off the presented token is
    /// handed back and stays usable until it expires.
    ///
    /// # Errors
    /// `TokenNotFound`, `TokenRevoked`, `TokenExpired`, or a store error
    #[tracing::instrument(name = "refresh", skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, AppError> {
        let (user_id, refresh_token) = if self.rotate_refresh_tokens {
            let rotated = self.refresh_tokens.rotate(refresh_token).await?;
            (rotated.user_id, rotated.token)
        } else {
            let user_id = self.refresh_tokens.validate(refresh_token).await?;
            (user_id, refresh_token.to_string())
        };

        let access_token = self.access_tokens.issue(user_id)?;

        tracing::info!(
            user_id = %user_id,
            rotated = self.rotate_refresh_tokens,
            "Token refreshed successfully"
        );

        Ok(self.session(user_id, access_token, refresh_token))
    }

    /// Revoke the presented refresh token
    ///
    /// # Errors
    /// `TokenNotFound` if the token was never issued, or a store error
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        self.refresh_tokens.revoke(refresh_token).await
    }

    /// Revoke every refresh token of a user
    pub async fn logout_everywhere(&self, user_id: Uuid) -> Result<u64, AppError> {
        self.refresh_tokens.revoke_all_for_user(user_id).await
    }

    /// Resolve an access token to its user
    pub fn authenticate(&self, access_token: &str) -> Result<Uuid, AuthError> {
        self.access_tokens.validate(access_token)
    }

    /// Run bcrypt off the async workers
    ///
    /// With no stored hash the dummy verify runs and the result is always
    /// `CredentialMismatch`. The outer error is only a failed blocking task.
    async fn check_password(
        &self,
        stored_hash: Option<String>,
        password: &str,
    ) -> Result<Result<(), AuthError>, AppError> {
        let hasher = self.hasher;
        let password = password.to_string();

        tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify(&hash, &password),
            None => Err(hasher.verify_unknown_user(&password)),
        })
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
    }

    fn session(&self, user_id: Uuid, access_token: String, refresh_token: String) -> Session {
        Session {
            user_id,
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_tokens.lifetime().num_seconds(),
        }
    }
}
