//! Password hashing and strength validation.
//!
//! Hashing uses Argon2id with configurable cost. Digests are PHC strings
//! (`$argon2id$v=19$...`) carrying their own salt and parameters, so a digest
//! produced under older cost settings still verifies after a config change.
//!
//! Argon2 is deliberately slow; the `*_async` wrappers move the work onto the
//! blocking pool so request tasks are not starved.

use std::fmt;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use crate::config::PasswordConfig;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 12;

/// Maximum accepted password length, in characters.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Substrings that make a password weak regardless of its other properties.
const WEAK_SUBSTRINGS: &[&str] = &["password", "qwerty", "letmein", "welcome", "admin"];

/// Small illustrative denylist. Production deployments should also consult
/// a breach corpus.
const COMMON_PASSWORDS: &[&str] = &[
    "123456",
    "12345678",
    "password",
    "qwerty",
    "abc123",
    "letmein",
    "welcome",
    "iloveyou",
    "monkey",
    "dragon",
    "football",
    "sunshine",
    "princess",
    "trustno1",
    "hospital",
];

/// Errors from [`PasswordHasher`].
#[derive(Debug, thiserror::Error)]
pub enum PasswordHashError {
    /// Empty passwords are never hashed.
    #[error("password must not be empty")]
    EmptyInput,

    /// The Argon2 parameters were rejected.
    #[error("invalid hashing parameters: {0}")]
    InvalidParams(String),

    /// Hashing failed inside argon2.
    #[error("hashing failed: {0}")]
    Hashing(String),
}

// ============================================================================
// Hasher
// ============================================================================

/// Salted Argon2id hasher.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    /// Digest of a random value under the same parameters. Verified against
    /// when no credential exists, so both login failure paths cost one hash.
    dummy_digest: String,
}

impl fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("params", self.argon2.params())
            .finish_non_exhaustive()
    }
}

impl PasswordHasher {
    /// Creates a hasher with the given cost parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` if Argon2 rejects the parameters.
    pub fn new(config: &PasswordConfig) -> Result<Self, PasswordHashError> {
        let params = Params::new(
            config.memory_cost_kib,
            config.time_cost,
            config.parallelism,
            None,
        )
        .map_err(|e| PasswordHashError::InvalidParams(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = SaltString::generate(&mut OsRng);
        let dummy_digest = argon2
            .hash_password(salt.as_str().as_bytes(), &salt)
            .map_err(|e| PasswordHashError::Hashing(e.to_string()))?
            .to_string();

        Ok(Self {
            argon2,
            dummy_digest,
        })
    }

    /// Hashes a password with a fresh random salt.
    ///
    /// Two calls with the same input produce different digests.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` for an empty password.
    pub fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        if password.is_empty() {
            return Err(PasswordHashError::EmptyInput);
        }
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PasswordHashError::Hashing(e.to_string()))
    }

    /// Verifies a password against a stored digest.
    ///
    /// The comparison inside argon2 is constant-time. Any failure, including
    /// a malformed digest, yields `false`.
    #[must_use]
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burns one verification's worth of work against the dummy digest.
    ///
    /// Always returns `false` in practice; callers ignore the result.
    pub fn verify_dummy(&self, password: &str) -> bool {
        self.verify(password, &self.dummy_digest)
    }

    /// [`hash`](Self::hash) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Same as [`hash`](Self::hash).
    pub async fn hash_async(&self, password: &str) -> Result<String, PasswordHashError> {
        let hasher = self.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordHashError::Hashing(format!("hash task failed: {e}")))?
    }

    /// [`verify`](Self::verify) on the blocking thread pool.
    pub async fn verify_async(&self, password: &str, digest: &str) -> bool {
        let hasher = self.clone();
        let password = password.to_owned();
        let digest = digest.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .unwrap_or(false)
    }

    /// [`verify_dummy`](Self::verify_dummy) on the blocking thread pool.
    pub async fn verify_dummy_async(&self, password: &str) {
        let hasher = self.clone();
        let password = password.to_owned();
        let _ = tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await;
    }
}

// ============================================================================
// Strength validation
// ============================================================================

/// A single password rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrengthViolation {
    /// Shorter than the minimum length.
    TooShort { min: usize },
    /// Longer than the maximum length.
    TooLong { max: usize },
    /// No upper-case letter.
    MissingUppercase,
    /// No lower-case letter.
    MissingLowercase,
    /// No digit.
    MissingDigit,
    /// No special (non-alphanumeric) character.
    MissingSpecial,
    /// The same character four or more times in a row.
    RepeatedCharacters,
    /// Contains a known weak pattern.
    WeakPattern(String),
}

impl fmt::Display for StrengthViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { min } => write!(f, "must be at least {min} characters"),
            Self::TooLong { max } => write!(f, "must be at most {max} characters"),
            Self::MissingUppercase => write!(f, "must contain an upper-case letter"),
            Self::MissingLowercase => write!(f, "must contain a lower-case letter"),
            Self::MissingDigit => write!(f, "must contain a digit"),
            Self::MissingSpecial => write!(f, "must contain a special character"),
            Self::RepeatedCharacters => {
                write!(f, "must not repeat a character four or more times in a row")
            }
            Self::WeakPattern(p) => write!(f, "must not contain the weak pattern '{p}'"),
        }
    }
}

/// Result of [`validate_strength`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrengthReport {
    pub valid: bool,
    pub violations: Vec<StrengthViolation>,
}

impl StrengthReport {
    /// Human-readable violations joined for an error message.
    #[must_use]
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Enumerates every rule the password violates.
#[must_use]
pub fn validate_strength(password: &str) -> StrengthReport {
    let mut violations = Vec::new();
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        violations.push(StrengthViolation::TooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    if length > MAX_PASSWORD_LENGTH {
        violations.push(StrengthViolation::TooLong {
            max: MAX_PASSWORD_LENGTH,
        });
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push(StrengthViolation::MissingUppercase);
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push(StrengthViolation::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push(StrengthViolation::MissingDigit);
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        violations.push(StrengthViolation::MissingSpecial);
    }
    if has_repeated_run(password, 4) {
        violations.push(StrengthViolation::RepeatedCharacters);
    }

    let lower = password.to_lowercase();
    for pattern in WEAK_SUBSTRINGS {
        if lower.contains(pattern) {
            violations.push(StrengthViolation::WeakPattern((*pattern).to_string()));
        }
    }
    if let Some(run) = sequential_digits(password, 4) {
        violations.push(StrengthViolation::WeakPattern(run));
    }

    StrengthReport {
        valid: violations.is_empty(),
        violations,
    }
}

/// Case-insensitive substring match against the common-password denylist.
#[must_use]
pub fn is_common(password: &str) -> bool {
    let lower = password.to_lowercase();
    COMMON_PASSWORDS.iter().any(|common| lower.contains(common))
}

fn has_repeated_run(password: &str, run: usize) -> bool {
    let mut previous = None;
    let mut count = 0;
    for c in password.chars() {
        if Some(c) == previous {
            count += 1;
        } else {
            previous = Some(c);
            count = 1;
        }
        if count >= run {
            return true;
        }
    }
    false
}

/// First run of `len` ascending or descending consecutive digits, if any.
fn sequential_digits(password: &str, len: usize) -> Option<String> {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(len).find_map(|w| {
        let digits: Option<Vec<i32>> = w
            .iter()
            .map(|c| c.to_digit(10).map(|d| d as i32))
            .collect();
        let digits = digits?;
        let step = digits[1] - digits[0];
        if step.abs() == 1 && digits.windows(2).all(|p| p[1] - p[0] == step) {
            Some(w.iter().collect())
        } else {
            None
        }
    })
}
