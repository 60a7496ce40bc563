//! Authentication configuration.
//!
//! Token lifetimes, the HMAC signing secret, lockout policy and Argon2 cost
//! parameters. Durations are written in humantime form (`"15m"`, `"7d"`).

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Minimum length of the HMAC signing secret, in bytes.
pub const MIN_SIGNING_SECRET_BYTES: usize = 32;

/// Longest accepted lockout window and lockout duration (30 days).
pub const MAX_LOCKOUT_SPAN: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "medrec"
/// failure_delay = "1s"
/// trusted_proxies = ["10.0.0.2"]
///
/// [auth.signing]
/// secret = "change-me-to-at-least-thirty-two-bytes"
///
/// [auth.tokens]
/// access_token_lifetime = "15m"
/// refresh_token_lifetime = "7d"
///
/// [auth.lockout]
/// max_attempts = 5
/// window = "15m"
/// lockout_duration = "15m"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Value of the `iss` claim; tokens with another issuer are rejected.
    pub issuer: String,

    /// Access token signing configuration.
    pub signing: SigningConfig,

    /// Token lifetimes.
    pub tokens: TokenConfig,

    /// Brute-force lockout policy.
    pub lockout: LockoutConfig,

    /// Argon2 cost parameters.
    pub password: PasswordConfig,

    /// Artificial delay applied to every failed login, so unknown-user and
    /// wrong-password responses take the same time.
    #[serde(with = "humantime_serde")]
    pub failure_delay: Duration,

    /// Peers allowed to report the client address through
    /// `X-Forwarded-For` / `X-Real-IP`. Empty means the headers are ignored
    /// and the connection peer is the origin.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "medrec".to_string(),
            signing: SigningConfig::default(),
            tokens: TokenConfig::default(),
            lockout: LockoutConfig::default(),
            password: PasswordConfig::default(),
            failure_delay: Duration::from_secs(1),
            trusted_proxies: Vec::new(),
        }
    }
}

/// HMAC signing configuration.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Symmetric secret for HS256. Must be at least 32 bytes.
    pub secret: String,
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime. Records older than this never match and
    /// are removed by the purge task.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(900),
            refresh_token_lifetime: Duration::from_secs(604_800),
        }
    }
}

/// Sliding-window lockout policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Failures within `window` that lock the (identifier, origin) pair.
    pub max_attempts: u32,

    /// Trailing window in which failures are counted.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// How long the lock lasts, measured from the oldest counted failure.
    #[serde(with = "humantime_serde")]
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            lockout_duration: Duration::from_secs(15 * 60),
        }
    }
}

/// Argon2id cost parameters.
///
/// The defaults target roughly 300ms per hash on server hardware.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB.
    pub memory_cost_kib: u32,
    /// Number of passes.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: 64 * 1024,
            time_cost: 3,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    /// Lowest-cost parameters Argon2 accepts. For tests and local development.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            memory_cost_kib: 8,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the signing secret is empty, and
    /// `ConfigError::InvalidValue` if:
    /// - The issuer is empty
    /// - The signing secret is shorter than 32 bytes
    /// - A token lifetime, the lockout window or the lockout duration is zero
    /// - The lockout window or duration exceeds [`MAX_LOCKOUT_SPAN`]
    /// - `max_attempts` is zero
    /// - The Argon2 parameters are out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.signing.secret.is_empty() {
            return Err(ConfigError::Missing("auth.signing.secret".to_string()));
        }
        if self.signing.secret.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "signing secret must be at least {} bytes, got {}",
                MIN_SIGNING_SECRET_BYTES,
                self.signing.secret.len()
            )));
        }

        if self.tokens.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }
        if self.tokens.refresh_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.lockout.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "lockout.max_attempts must be > 0".to_string(),
            ));
        }
        if self.lockout.window.is_zero() || self.lockout.lockout_duration.is_zero() {
            return Err(ConfigError::InvalidValue(
                "lockout.window and lockout.lockout_duration must be > 0".to_string(),
            ));
        }
        if self.lockout.window > MAX_LOCKOUT_SPAN || self.lockout.lockout_duration > MAX_LOCKOUT_SPAN
        {
            return Err(ConfigError::InvalidValue(format!(
                "lockout.window and lockout.lockout_duration must be at most {}s",
                MAX_LOCKOUT_SPAN.as_secs()
            )));
        }

        let p = &self.password;
        if p.time_cost == 0 || p.parallelism == 0 {
            return Err(ConfigError::InvalidValue(
                "password.time_cost and password.parallelism must be > 0".to_string(),
            ));
        }
        if p.memory_cost_kib < 8 * p.parallelism {
            return Err(ConfigError::InvalidValue(format!(
                "password.memory_cost_kib must be at least 8 * parallelism ({})",
                8 * p.parallelism
            )));
        }

        Ok(())
    }
}
