// In-memory credential store, for tests and single-process embedding

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Credential, CredentialStore, RefreshTokenRecord, RevokeOutcome};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential (signup happens outside this crate)
    pub fn insert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write().map_err(poisoned)?;
        if credentials.contains_key(&credential.identifier) {
            return Err(StoreError::Conflict(format!(
                "credential {}",
                credential.identifier
            )));
        }
        credentials.insert(credential.identifier.clone(), credential);
        Ok(())
    }

    pub fn refresh_token_count(&self) -> Result<usize, StoreError> {
        Ok(self.refresh_tokens.read().map_err(poisoned)?.len())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credential_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Credential, StoreError> {
        self.credentials
            .read()
            .map_err(poisoned)?
            .get(identifier)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("credential".to_string()))
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let mut tokens = self.refresh_tokens.write().map_err(poisoned)?;
        if tokens.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict("refresh token".to_string()));
        }
        tokens.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn get_refresh_token(&self, token_hash: &str) -> Result<RefreshTokenRecord, StoreError> {
        self.refresh_tokens
            .read()
            .map_err(poisoned)?
            .get(token_hash)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("refresh token".to_string()))
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StoreError> {
        let mut tokens = self.refresh_tokens.write().map_err(poisoned)?;
        let record = tokens
            .get_mut(token_hash)
            .ok_or_else(|| StoreError::NotFound("refresh token".to_string()))?;

        if record.revoked_at.is_some() {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        record.revoked_at = Some(revoked_at);
        Ok(RevokeOutcome::Revoked)
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut tokens = self.refresh_tokens.write().map_err(poisoned)?;
        let mut revoked = 0;
        for record in tokens
            .values_mut()
            .filter(|r| r.user_id == user_id && r.revoked_at.is_none())
        {
            record.revoked_at = Some(revoked_at);
            revoked += 1;
        }
        Ok(revoked)
    }
}
