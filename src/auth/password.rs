/// Password Hashing and Verification
///
/// Salted bcrypt hashes with a configurable cost.

use std::collections::HashMap;
use std::sync::Mutex;

use bcrypt::{hash, verify};

use crate::configuration::AuthSettings;
use crate::error::AuthError;

/// bcrypt only reads the first 72 bytes of its input
pub const MAX_PASSWORD_BYTES: usize = 72;

lazy_static::lazy_static! {
    /// Hashes checked against when the identifier is unknown, one per cost,
    /// so that path costs the same as a wrong password.
    static ref DUMMY_HASHES: Mutex<HashMap<u32, String>> = Mutex::new(HashMap::new());
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(settings.bcrypt_cost)
    }

    /// Hash a password using bcrypt
    ///
    /// # Errors
    /// Returns `HashingFailed` if the password is longer than
    /// `MAX_PASSWORD_BYTES` (it is never truncated) or bcrypt itself fails.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::HashingFailed(format!(
                "password exceeds {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }

        hash(password, self.cost).map_err(|e| AuthError::HashingFailed(e.to_string()))
    }

    /// Verify a password against its stored hash
    ///
    /// # Errors
    /// Returns `CredentialMismatch` for a wrong password, an over-long
    /// password, or a stored hash that cannot be parsed.
    pub fn verify(&self, hashed: &str, password: &str) -> Result<(), AuthError> {
        // bcrypt would compare only the 72-byte prefix
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::CredentialMismatch);
        }

        match verify(password, hashed) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::CredentialMismatch),
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash could not be parsed");
                Err(AuthError::CredentialMismatch)
            }
        }
    }

    /// Burn one verification's worth of CPU and report a mismatch
    pub fn verify_unknown_user(&self, password: &str) -> AuthError {
        if let Some(dummy) = self.dummy_hash() {
            let _ = self.verify(&dummy, password);
        }
        AuthError::CredentialMismatch
    }

    /// Dummy hash at this hasher's cost, computed on first use
    fn dummy_hash(&self) -> Option<String> {
        let mut cache = DUMMY_HASHES
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = cache.get(&self.cost) {
            return Some(existing.clone());
        }

        match hash("chirpy-timing-equalizer", self.cost) {
            Ok(dummy) => {
                cache.insert(self.cost, dummy.clone());
                Some(dummy)
            }
            Err(e) => {
                tracing::error!(error = %e, cost = self.cost, "Failed to build dummy password hash");
                None
            }
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    #[test]
    fn test_hash_password() {
        let password = "myS3cret!";
        let hash = hasher().hash(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hasher().hash("same-password").expect("Failed to hash password");
        let second = hasher().hash("same-password").expect("Failed to hash password");

        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hash = hasher().hash("myS3cret!").expect("Failed to hash password");

        assert_eq!(hasher().verify(&hash, "myS3cret!"), Ok(()));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hasher().hash("myS3cret!").expect("Failed to hash password");

        assert_eq!(
            hasher().verify(&hash, "wrong-password"),
            Err(AuthError::CredentialMismatch)
        );
    }

    #[test]
    fn test_short_and_empty_passwords_round_trip() {
        for password in ["", "a", "pässwörd"] {
            let hash = hasher().hash(password).expect("Failed to hash password");
            assert!(hasher().verify(&hash, password).is_ok());
        }
    }

    #[test]
    fn test_max_length_password_is_accepted() {
        let password = "x".repeat(MAX_PASSWORD_BYTES);
        let hash = hasher().hash(&password).expect("Failed to hash password");

        assert!(hasher().verify(&hash, &password).is_ok());
    }

    #[test]
    fn test_too_long_password_is_rejected() {
        let password = "x".repeat(MAX_PASSWORD_BYTES + 1);

        assert!(matches!(
            hasher().hash(&password),
            Err(AuthError::HashingFailed(_))
        ));
    }

    #[test]
    fn test_too_long_password_never_verifies_against_prefix() {
        let prefix = "x".repeat(MAX_PASSWORD_BYTES);
        let hash = hasher().hash(&prefix).expect("Failed to hash password");

        let longer = format!("{}y", prefix);
        assert_eq!(
            hasher().verify(&hash, &longer),
            Err(AuthError::CredentialMismatch)
        );
    }

    #[test]
    fn test_malformed_hash_is_a_mismatch() {
        assert_eq!(
            hasher().verify("not-a-bcrypt-hash", "anything"),
            Err(AuthError::CredentialMismatch)
        );
    }

    #[test]
    fn test_unknown_user_is_a_mismatch() {
        assert_eq!(
            hasher().verify_unknown_user("whatever"),
            AuthError::CredentialMismatch
        );
    }

    #[test]
    fn test_dummy_hash_uses_configured_cost() {
        let dummy = hasher().dummy_hash().expect("Failed to build dummy hash");
        assert!(dummy.starts_with("$2b$04$"), "unexpected cost in {}", dummy);

        let dummy = PasswordHasher::new(5)
            .dummy_hash()
            .expect("Failed to build dummy hash");
        assert!(dummy.starts_with("$2b$05$"), "unexpected cost in {}", dummy);
    }

    #[test]
    fn test_unknown_user_costs_about_as_much_as_wrong_password() {
        let hasher = PasswordHasher::new(8);
        let stored = hasher.hash("myS3cret!").expect("Failed to hash password");
        // Warm the dummy hash cache
        let _ = hasher.verify_unknown_user("warm-up");

        let started = std::time::Instant::now();
        let _ = hasher.verify(&stored, "wrong-password");
        let wrong_password = started.elapsed();

        let started = std::time::Instant::now();
        let _ = hasher.verify_unknown_user("wrong-password");
        let unknown_user = started.elapsed();

        let ratio = unknown_user.as_secs_f64() / wrong_password.as_secs_f64();
        assert!(
            (0.2..5.0).contains(&ratio),
            "wrong password took {:?}, unknown user took {:?}",
            wrong_password,
            unknown_user
        );
    }
}
