//! PostgreSQL storage backend for MedRec Auth
//!
//! Provides persistent storage for:
//!
//! - Credentials (`credential` table)
//! - Role assignments and role-permission grants (`role_assignment`,
//!   `role_permission` tables)
//! - Refresh token records (`refresh_token` table)
//!
//! Tables are created by [`PostgresAuthStorage::bootstrap_schema`], which is
//! idempotent and runs at server startup.
//!
//! # Example
//!
//! ```ignore
//! use medrec_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/medrec").await?;
//! storage.bootstrap_schema().await?;
//!
//! let roles = storage.roles().roles_for(user_id).await?;
//! ```

pub mod credential;
pub mod refresh_token;
pub mod role;
pub mod schema;
pub mod storage_adapters;

use std::sync::Arc;
use std::time::Duration;

use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_postgres::Postgres;

use medrec_auth::AuthError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use credential::{CredentialRow, CredentialStorage};
pub use refresh_token::{RefreshTokenRow, RefreshTokenStorage};
pub use role::RoleStorage;
pub use storage_adapters::{ArcCredentialStorage, ArcRefreshTokenStorage, ArcRoleStorage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists (unique violation).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a client error (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Conflict(_) | Self::InvalidInput(_)
        )
    }

    /// Returns `true` if this is a server error (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => AuthError::conflict(message),
            StorageError::InvalidInput(message) => AuthError::invalid_request(message),
            other => AuthError::storage(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Maps a unique violation to `Conflict`, everything else to `Database`.
pub(crate) fn conflict_on_unique(err: sqlx_core::Error, message: impl FnOnce() -> String) -> StorageError {
    if let sqlx_core::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StorageError::conflict(message());
    }
    StorageError::from(err)
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend for authentication data.
///
/// Holds a connection pool and hands out the per-table storage types.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database with default pool
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Create new storage with an explicit pool size and acquire timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect_with(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(Arc::new(pool)))
    }

    /// Creates the auth tables and indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn bootstrap_schema(&self) -> StorageResult<()> {
        schema::bootstrap(&self.pool).await
    }

    /// Runs a trivial query to check connectivity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable.
    pub async fn ping(&self) -> StorageResult<()> {
        sqlx_core::query::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the Arc-wrapped pool.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Get credential storage operations.
    #[must_use]
    pub fn credentials(&self) -> CredentialStorage<'_> {
        CredentialStorage::new(&self.pool)
    }

    /// Get role storage operations.
    #[must_use]
    pub fn roles(&self) -> RoleStorage<'_> {
        RoleStorage::new(&self.pool)
    }

    /// Get refresh token storage operations.
    #[must_use]
    pub fn refresh_tokens(&self) -> RefreshTokenStorage<'_> {
        RefreshTokenStorage::new(&self.pool)
    }

    // -------------------------------------------------------------------------
    // Trait Adapters
    // -------------------------------------------------------------------------

    /// Arc-owning adapters for use as `Arc<dyn ...>` in `AuthStorages`.
    #[must_use]
    pub fn auth_storages(&self) -> medrec_auth::AuthStorages {
        medrec_auth::AuthStorages {
            credentials: Arc::new(ArcCredentialStorage::new(self.pool_arc())),
            roles: Arc::new(ArcRoleStorage::new(self.pool_arc())),
            refresh_tokens: Arc::new(ArcRefreshTokenStorage::new(self.pool_arc())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_not_found() {
        let err = StorageError::not_found("Credential 42");
        assert!(err.is_not_found());
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.to_string(), "Not found: Credential 42");
    }

    #[test]
    fn test_storage_error_conflict() {
        let err = StorageError::conflict("username taken");
        assert!(err.is_conflict());
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_storage_error_into_auth_error() {
        let auth: AuthError = StorageError::conflict("username taken").into();
        assert!(matches!(auth, AuthError::Conflict { .. }));

        let auth: AuthError = StorageError::invalid_input("bad lookup id").into();
        assert!(matches!(auth, AuthError::InvalidRequest { .. }));

        let auth: AuthError = StorageError::not_found("row").into();
        assert!(matches!(auth, AuthError::Storage { .. }));
        assert!(auth.is_server_error());
    }
}
