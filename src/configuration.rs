use std::fmt;

use chrono::Duration;

use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("database_name", &self.database_name)
            .finish()
    }
}

/// Symmetric key used to sign and verify access tokens.
///
/// Deliberately has no `Display` impl, and `Debug` is redacted, so it cannot
/// end up in a log line by accident.
#[derive(serde::Deserialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret([REDACTED])")
    }
}

/// Token and credential settings, injected once into the auth components
#[derive(serde::Deserialize, Clone, Debug)]
pub struct AuthSettings {
    pub signing_secret: SigningSecret,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: i64,   // seconds (3600 = 1 hour)
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime_secs: i64,  // seconds (5184000 = 60 days)
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_rotate_refresh_tokens")]
    pub rotate_refresh_tokens: bool,
}

fn default_issuer() -> String {
    "chirpy".to_string()
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    60 * 24 * 3600
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_store_timeout() -> u64 {
    5000
}

fn default_rotate_refresh_tokens() -> bool {
    true
}

impl AuthSettings {
    /// Settings with every default applied and the given secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            signing_secret: SigningSecret::new(secret),
            issuer: default_issuer(),
            access_token_lifetime_secs: default_access_token_lifetime(),
            refresh_token_lifetime_secs: default_refresh_token_lifetime(),
            bcrypt_cost: default_bcrypt_cost(),
            store_timeout_ms: default_store_timeout(),
            rotate_refresh_tokens: default_rotate_refresh_tokens(),
        }
    }

    pub fn access_token_lifetime(&self) -> Duration {
        Duration::seconds(self.access_token_lifetime_secs)
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        Duration::seconds(self.refresh_token_lifetime_secs)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }

    /// Reject settings that would break token invariants
    ///
    /// # Errors
    /// Returns `ConfigError` for an empty secret or issuer, a non-positive
    /// lifetime or timeout, or a bcrypt cost bcrypt itself would refuse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_secret.is_empty() {
            return Err(ConfigError::MissingRequired("auth.signing_secret".to_string()));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("auth.issuer".to_string()));
        }
        // expiresAt must always be strictly after issuedAt
        if self.access_token_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "auth.access_token_lifetime_secs must be positive".to_string(),
            ));
        }
        if self.refresh_token_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "auth.refresh_token_lifetime_secs must be positive".to_string(),
            ));
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.bcrypt_cost
            )));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.store_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `configuration.yaml` (optional) and `APP_*` env vars
///
/// e.g. `APP_AUTH__SIGNING_SECRET=...` overrides `auth.signing_secret`.
///
/// # Errors
/// Returns `ConfigError` if the sources cannot be read or the auth settings
/// fail `AuthSettings::validate`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    parse_configuration(settings)
}

/// Deserialize and validate already-assembled configuration sources
pub fn parse_configuration(source: config::Config) -> Result<Settings, ConfigError> {
    let settings = source.try_deserialize::<Settings>()?;
    settings.auth.validate()?;
    Ok(settings)
}
