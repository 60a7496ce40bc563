//! Refresh token storage trait.
//!
//! # Security Considerations
//!
//! - Records hold an Argon2 digest of the secret, never the secret
//! - `revoke` must be a conditional write: of two concurrent calls for the
//!   same record exactly one reports `true`
//! - A revoked record is never reactivated

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::RefreshTokenRecord;

/// Storage trait for refresh token records.
///
/// # Implementations
///
/// - [`InMemoryRefreshTokenStorage`](super::InMemoryRefreshTokenStorage)
/// - `medrec-auth-postgres` - PostgreSQL storage backend
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()>;

    /// Active records with this lookup id, optionally scoped to one identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_active_by_lookup(
        &self,
        lookup_id: &str,
        user_id: Option<Uuid>,
    ) -> AuthResult<Vec<RefreshTokenRecord>>;

    /// Active records owned by the identity, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_active_for_user(&self, user_id: Uuid) -> AuthResult<Vec<RefreshTokenRecord>>;

    /// Sets `revoked_at` if it is unset.
    ///
    /// Returns `true` only if this call performed the revocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke(&self, id: Uuid, at: OffsetDateTime) -> AuthResult<bool>;

    /// Revokes every active record of the identity. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_all_for_user(&self, user_id: Uuid, at: OffsetDateTime) -> AuthResult<u64>;

    /// Deletes records issued before `cutoff`, revoked or not. Returns the
    /// number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_issued_before(&self, cutoff: OffsetDateTime) -> AuthResult<u64>;
}
