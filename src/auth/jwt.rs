/// JWT Token Generation and Validation
///
/// Stateless HS256 access tokens. Validity is decided from the signature
/// and the embedded timestamps only; nothing is persisted.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::clock::{Clock, SystemClock};
use crate::configuration::AuthSettings;
use crate::error::{AppError, AuthError, ConfigError};

/// Issues and validates access tokens with a secret fixed at construction
#[derive(Clone)]
pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for AccessTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenCodec")
            .field("issuer", &self.issuer)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl AccessTokenCodec {
    /// # Errors
    /// Returns `ConfigError` for an empty secret or a non-positive lifetime
    pub fn new(settings: &AuthSettings) -> Result<Self, ConfigError> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &AuthSettings, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        settings.validate()?;

        let secret = settings.signing_secret.expose_bytes();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: settings.issuer.clone(),
            lifetime: settings.access_token_lifetime(),
            clock,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Generate a new access token for a user
    ///
    /// # Errors
    /// Returns `Internal` if signing fails
    pub fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        let claims = Claims::new(user_id, &self.issuer, self.clock.now(), self.lifetime);

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Validate an access token and return the user it was issued to
    ///
    /// Checks run in order: signature and required claims, expiry, subject.
    ///
    /// # Errors
    /// - `InvalidSignature` if the token is tampered with, signed with
    ///   another secret, malformed, or from another issuer
    /// - `TokenExpired` once the clock reaches `exp`
    /// - `MalformedSubject` if `sub` is not a UUID
    pub fn validate(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.decode_claims(token)?;

        if claims.is_expired_at(self.clock.now()) {
            tracing::debug!(sub = %claims.sub, "Access token expired");
            return Err(AuthError::TokenExpired);
        }

        claims.user_id()
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSubject => AuthError::MalformedSubject,
                _ => {
                    tracing::warn!(error = %e, "JWT validation error");
                    AuthError::InvalidSignature
                }
            })
    }
}
