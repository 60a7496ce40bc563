//! # medrec-auth
//!
//! Authentication and session security for the MedRec hospital-records API.
//!
//! This crate provides:
//! - Argon2id password hashing and strength validation
//! - Signed access tokens and opaque, rotating refresh tokens
//! - Sliding-window brute-force lockout per (identifier, origin)
//! - Role-based permission resolution
//! - Login, refresh and logout orchestration
//! - Axum extractors, middleware and handlers for the `/auth` endpoints
//!
//! ## Modules
//!
//! - [`config`] - Authentication configuration
//! - [`password`] - Password hashing and strength rules
//! - [`token`] - Access token signing and refresh secret generation
//! - [`refresh`] - Refresh token persistence, matching and revocation
//! - [`lockout`] - Failed-login tracking
//! - [`permission`] - Role and permission resolution
//! - [`service`] - Authentication flows
//! - [`guard`] - Per-request authentication and permission checks
//! - [`middleware`] - Axum extractors and middleware
//! - [`http`] - Axum handlers for `/auth/*`
//! - [`storage`] - Storage traits and in-memory backends

pub mod config;
pub mod device;
pub mod error;
pub mod guard;
pub mod http;
pub mod lockout;
pub mod middleware;
pub mod password;
pub mod permission;
pub mod refresh;
pub mod service;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use guard::{AuthenticationGuard, PermissionGuard};
pub use http::auth_router;
pub use lockout::{InMemoryLockoutStore, LockStatus, LockoutStore, LockoutTracker};
pub use middleware::{AuthState, BearerAuth, ClientDevice, RequiredPermissions};
pub use password::PasswordHasher;
pub use permission::PermissionResolver;
pub use refresh::RefreshTokenStore;
pub use service::{AuthService, AuthStorages, TokenPair};
pub use storage::{CredentialStorage, RefreshTokenStorage, RoleStorage};
pub use token::{AccessTokenClaims, TokenIssuer};
pub use types::{Credential, DeviceMetadata, Identity, RefreshTokenRecord, SessionSummary};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use medrec_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::lockout::{LockoutStore, LockoutTracker};
    pub use crate::middleware::{
        AuthState, BearerAuth, ClientDevice, RequiredPermissions, authenticate, permission_guard,
    };
    pub use crate::service::{AuthService, AuthStorages, TokenPair};
    pub use crate::storage::{CredentialStorage, RefreshTokenStorage, RoleStorage};
    pub use crate::types::{Credential, DeviceMetadata, Identity, SessionSummary};
}
