//! HS256 access tokens.
//!
//! Access tokens are self-contained signed claims; verification needs no
//! database lookup. Expiry is checked against an explicit clock so the
//! boundary is exact: a token is valid while `now < exp`.
//!
//! ## Example
//!
//! ```ignore
//! use medrec_auth::token::TokenIssuer;
//!
//! let issuer = TokenIssuer::from_config(&config)?;
//! let claims = issuer.claims_for(&identity, OffsetDateTime::now_utc());
//! let token = issuer.sign_access(&claims)?;
//! let verified = issuer.verify_access(&token)?;
//! ```

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::{AuthConfig, MIN_SIGNING_SECRET_BYTES};
use crate::error::AuthError;
use crate::token::secret::generate_refresh_secret;
use crate::types::Identity;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from access token verification and signing.
///
/// `Expired` and `Invalid` are kept apart so logs can tell a stale token
/// from a forged one, even though clients see the same response.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// The token's `exp` has passed.
    #[error("Token expired")]
    Expired,

    /// Bad signature, malformed token, or issuer mismatch.
    #[error("Invalid token: {message}")]
    Invalid {
        /// Description of why the token is invalid.
        message: String,
    },

    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Short label for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Invalid { .. } => "invalid",
            Self::Encoding { .. } => "encoding",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::invalid(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::Invalid { message } => AuthError::token_invalid(message),
            JwtError::Encoding { message } => AuthError::internal(message),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Identity id.
    pub sub: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub iss: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

impl AccessTokenClaims {
    /// Seconds from `iat` to `exp`.
    #[must_use]
    pub fn lifetime_secs(&self) -> i64 {
        self.exp - self.iat
    }
}

// ============================================================================
// Issuer
// ============================================================================

/// Signs and verifies access tokens; generates refresh secrets.
///
/// Thread-safe and cheap to share behind an `Arc`.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Creates an issuer from a raw secret.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the secret is shorter than
    /// 32 bytes.
    pub fn new(
        secret: &[u8],
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> AuthResult<Self> {
        if secret.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(AuthError::configuration(format!(
                "signing secret must be at least {MIN_SIGNING_SECRET_BYTES} bytes"
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
        })
    }

    /// Creates an issuer from the auth configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the signing secret is too short.
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        Self::new(
            config.signing.secret.as_bytes(),
            config.issuer.clone(),
            config.tokens.access_token_lifetime,
            config.tokens.refresh_token_lifetime,
        )
    }

    /// Issuer string placed in `iss`.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Access token lifetime.
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Refresh token lifetime.
    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Builds claims for `identity` issued at `now`.
    #[must_use]
    pub fn claims_for(&self, identity: &Identity, now: OffsetDateTime) -> AccessTokenClaims {
        let iat = now.unix_timestamp();
        AccessTokenClaims {
            sub: identity.id.to_string(),
            username: identity.username.clone(),
            email: identity.email.clone(),
            roles: identity.roles.clone(),
            iss: self.issuer.clone(),
            iat,
            exp: iat + self.access_ttl.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Signs claims into a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Encoding` if serialization fails.
    pub fn sign_access(&self, claims: &AccessTokenClaims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            JwtError::Encoding {
                message: e.to_string(),
            }
        })
    }

    /// Verifies a token against the current time.
    ///
    /// # Errors
    ///
    /// See [`verify_access_at`](Self::verify_access_at).
    pub fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        self.verify_access_at(token, OffsetDateTime::now_utc())
    }

    /// Verifies a token as of `now`.
    ///
    /// Signature, format and issuer are checked first; a token failing any
    /// of those is `Invalid` even if it is also past `exp`.
    ///
    /// # Errors
    ///
    /// - `JwtError::Invalid` for a bad signature, malformed token or wrong issuer
    /// - `JwtError::Expired` if `now >= exp`
    pub fn verify_access_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)?.claims;

        if now.unix_timestamp() >= claims.exp {
            return Err(JwtError::Expired);
        }
        Ok(claims)
    }

    /// Generates a new opaque refresh secret.
    #[must_use]
    pub fn new_refresh_secret(&self) -> String {
        generate_refresh_secret()
    }
}

// ============================================================================
// Tests
// ============================================================================
