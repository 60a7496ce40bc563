//! Storage traits for authentication data.
//!
//! - [`CredentialStorage`] - username/email/password-hash records
//! - [`RoleStorage`] - role assignments and role-permission grants
//! - [`RefreshTokenStorage`] - refresh token records
//!
//! # Implementations
//!
//! - [`memory`] - in-process maps, for tests and single-node development
//! - `medrec-auth-postgres` - PostgreSQL storage backend

pub mod credential;
pub mod memory;
pub mod refresh_token;
pub mod role;

pub use credential::CredentialStorage;
pub use memory::{InMemoryCredentialStorage, InMemoryRefreshTokenStorage, InMemoryRoleStorage};
pub use refresh_token::RefreshTokenStorage;
pub use role::RoleStorage;
