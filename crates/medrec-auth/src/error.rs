//! Authentication and authorization error types.
//!
//! Core operations return [`AuthError`] values; the mapping to HTTP status
//! codes lives at the transport edge in [`crate::middleware::error`].

use std::fmt;

use time::OffsetDateTime;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Username/password or refresh secret did not check out.
    ///
    /// The message shown to clients never says which factor was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials {
        /// Failed attempts left before the (identifier, origin) pair locks.
        remaining_attempts: Option<u32>,
    },

    /// Too many recent failures from this (identifier, origin) pair.
    #[error("Account locked until {unlock_at}")]
    AccountLocked {
        /// Instant at which the lock lifts on its own.
        unlock_at: OffsetDateTime,
    },

    /// The access token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The access token signature, format or issuer is wrong.
    #[error("Invalid token: {message}")]
    TokenInvalid {
        /// Description of why the token is invalid.
        message: String,
    },

    /// No token was presented where one is required.
    #[error("Token not found")]
    TokenNotFound,

    /// The request lacks valid authentication.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Server-side description; clients get a generic message.
        message: String,
    },

    /// The identity lacks at least one required permission.
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// The request body or parameters are malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// A username or email is already owned by an active credential.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid. Fatal at startup.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidCredentials` error without an attempt count.
    #[must_use]
    pub fn invalid_credentials() -> Self {
        Self::InvalidCredentials {
            remaining_attempts: None,
        }
    }

    /// Creates a new `InvalidCredentials` error carrying the remaining attempts.
    #[must_use]
    pub fn invalid_credentials_with_remaining(remaining: u32) -> Self {
        Self::InvalidCredentials {
            remaining_attempts: Some(remaining),
        }
    }

    /// Creates a new `AccountLocked` error.
    #[must_use]
    pub fn account_locked(unlock_at: OffsetDateTime) -> Self {
        Self::AccountLocked { unlock_at }
    }

    /// Creates a new `TokenInvalid` error.
    #[must_use]
    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self::TokenInvalid {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this is an authentication error.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. }
                | Self::AccountLocked { .. }
                | Self::TokenExpired
                | Self::TokenInvalid { .. }
                | Self::TokenNotFound
                | Self::Unauthenticated { .. }
        )
    }

    /// Returns `true` if this is a token-related error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired | Self::TokenInvalid { .. } | Self::TokenNotFound
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidCredentials { .. } => ErrorCategory::Authentication,
            Self::AccountLocked { .. } => ErrorCategory::Lockout,
            Self::TokenExpired => ErrorCategory::Token,
            Self::TokenInvalid { .. } => ErrorCategory::Token,
            Self::TokenNotFound => ErrorCategory::Token,
            Self::Unauthenticated { .. } => ErrorCategory::Authentication,
            Self::InsufficientPermissions => ErrorCategory::Authorization,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Conflict { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code used in JSON error bodies.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials { .. } => "invalid_credentials",
            Self::AccountLocked { .. } => "account_locked",
            Self::TokenExpired
            | Self::TokenInvalid { .. }
            | Self::TokenNotFound
            | Self::Unauthenticated { .. } => "unauthenticated",
            Self::InsufficientPermissions => "insufficient_permissions",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Conflict { .. } => "conflict",
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
        }
    }
}

/// Categories of authentication/authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity verification failures.
    Authentication,
    /// Brute-force lockout in effect.
    Lockout,
    /// Permission checks.
    Authorization,
    /// Access token validation.
    Token,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Lockout => write!(f, "lockout"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
