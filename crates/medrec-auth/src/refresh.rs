//! Refresh token store.
//!
//! Wraps a [`RefreshTokenStorage`] backend with the secret handling: secrets
//! are Argon2-hashed before they are written, and matching narrows the
//! candidates by the public lookup prefix before a single constant-time
//! verification per candidate.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::password::PasswordHasher;
use crate::storage::RefreshTokenStorage;
use crate::token::lookup_id;
use crate::types::{DeviceMetadata, RefreshTokenRecord, SessionSummary};

/// Persists, matches, rotates and revokes refresh tokens.
#[derive(Clone)]
pub struct RefreshTokenStore {
    storage: Arc<dyn RefreshTokenStorage>,
    hasher: PasswordHasher,
    ttl: time::Duration,
}

impl RefreshTokenStore {
    /// Creates a store whose records stop matching after `ttl`.
    #[must_use]
    pub fn new(storage: Arc<dyn RefreshTokenStorage>, hasher: PasswordHasher, ttl: Duration) -> Self {
        Self {
            storage,
            hasher,
            ttl: to_time_duration(ttl),
        }
    }

    /// Refresh token lifetime.
    #[must_use]
    pub fn ttl(&self) -> time::Duration {
        self.ttl
    }

    /// Hashes `secret` and stores a new active record. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the secret is not a well-formed
    /// refresh secret or hashing fails, and storage errors as-is.
    pub async fn store(
        &self,
        user_id: Uuid,
        secret: &str,
        device: DeviceMetadata,
    ) -> AuthResult<Uuid> {
        let secret = secret.to_ascii_lowercase();
        let lookup = lookup_id(&secret)
            .ok_or_else(|| AuthError::internal("refusing to store malformed refresh secret"))?
            .to_string();
        let token_hash = self
            .hasher
            .hash_async(&secret)
            .await
            .map_err(|e| AuthError::internal(e.to_string()))?;

        let record = RefreshTokenRecord::new(
            user_id,
            lookup,
            token_hash,
            device,
            OffsetDateTime::now_utc(),
        );
        self.storage.create(&record).await?;

        tracing::debug!(user_id = %user_id, token_id = %record.id, "Stored refresh token");
        Ok(record.id)
    }

    /// Finds the active, unexpired record whose digest matches `secret`.
    ///
    /// Scoped to `user_id` when the caller already knows the identity.
    /// Malformed secrets never match.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn match_secret(
        &self,
        secret: &str,
        user_id: Option<Uuid>,
    ) -> AuthResult<Option<RefreshTokenRecord>> {
        self.match_secret_at(secret, user_id, OffsetDateTime::now_utc())
            .await
    }

    /// [`match_secret`](Self::match_secret) as of `now`.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn match_secret_at(
        &self,
        secret: &str,
        user_id: Option<Uuid>,
        now: OffsetDateTime,
    ) -> AuthResult<Option<RefreshTokenRecord>> {
        let secret = secret.to_ascii_lowercase();
        let Some(lookup) = lookup_id(&secret) else {
            return Ok(None);
        };

        let candidates = self.storage.find_active_by_lookup(lookup, user_id).await?;
        for record in candidates {
            if !record.is_usable_at(self.ttl, now) {
                continue;
            }
            if self.hasher.verify_async(&secret, &record.token_hash).await {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Revokes one record. Returns `true` only if this call revoked it.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn revoke(&self, id: Uuid) -> AuthResult<bool> {
        self.storage.revoke(id, OffsetDateTime::now_utc()).await
    }

    /// Revokes every active record of an identity. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn revoke_all(&self, user_id: Uuid) -> AuthResult<u64> {
        self.storage
            .revoke_all_for_user(user_id, OffsetDateTime::now_utc())
            .await
    }

    /// Deletes records issued more than `ttl` ago, revoked or not.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn purge_expired(&self, ttl: Duration) -> AuthResult<u64> {
        let cutoff = OffsetDateTime::now_utc() - to_time_duration(ttl);
        self.storage.delete_issued_before(cutoff).await
    }

    /// Active, unexpired sessions of an identity, newest first.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn list_active(&self, user_id: Uuid) -> AuthResult<Vec<SessionSummary>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .storage
            .list_active_for_user(user_id)
            .await?
            .iter()
            .filter(|r| r.is_usable_at(self.ttl, now))
            .map(|r| SessionSummary::from_record(r, self.ttl))
            .collect())
    }
}

fn to_time_duration(d: Duration) -> time::Duration {
    time::Duration::try_from(d).unwrap_or(time::Duration::MAX)
}
