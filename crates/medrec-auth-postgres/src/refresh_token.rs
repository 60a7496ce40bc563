//! Refresh token storage.
//!
//! Rows hold the Argon2 digest of the secret and its public lookup id.
//! `revoke` is a conditional update: only the call that flips `revoked_at`
//! from NULL reports success.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use medrec_auth::types::{DeviceMetadata, RefreshTokenRecord};

use crate::{PgPool, StorageResult};

// =============================================================================
// Types
// =============================================================================

type RefreshTokenTuple = (
    Uuid,
    Uuid,
    String,
    String,
    OffsetDateTime,
    Option<OffsetDateTime>,
    Option<String>,
    Option<String>,
);

/// Refresh token record from database.
#[derive(Debug, Clone)]
pub struct RefreshTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lookup_id: String,
    pub token_hash: String,
    pub issued_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

impl RefreshTokenRow {
    fn from_tuple(row: RefreshTokenTuple) -> Self {
        Self {
            id: row.0,
            user_id: row.1,
            lookup_id: row.2,
            token_hash: row.3,
            issued_at: row.4,
            revoked_at: row.5,
            origin: row.6,
            user_agent: row.7,
        }
    }
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            lookup_id: row.lookup_id,
            token_hash: row.token_hash,
            issued_at: row.issued_at,
            revoked_at: row.revoked_at,
            device: DeviceMetadata {
                origin: row.origin,
                user_agent: row.user_agent,
            },
        }
    }
}

// =============================================================================
// Refresh Token Storage
// =============================================================================

/// Refresh token storage operations.
pub struct RefreshTokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> RefreshTokenStorage<'a> {
    /// Create a new refresh token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn create(&self, record: &RefreshTokenRecord) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO refresh_token
                (id, user_id, lookup_id, token_hash, issued_at, revoked_at, origin, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.lookup_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.revoked_at)
        .bind(record.device.origin.as_deref())
        .bind(record.device.user_agent.as_deref())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Active records with this lookup id, optionally scoped to one identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_active_by_lookup(
        &self,
        lookup_id: &str,
        user_id: Option<Uuid>,
    ) -> StorageResult<Vec<RefreshTokenRow>> {
        let rows: Vec<RefreshTokenTuple> = query_as(
            r#"
            SELECT id, user_id, lookup_id, token_hash, issued_at, revoked_at, origin, user_agent
            FROM refresh_token
            WHERE lookup_id = $1
              AND revoked_at IS NULL
              AND ($2::uuid IS NULL OR user_id = $2)
            "#,
        )
        .bind(lookup_id)
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(RefreshTokenRow::from_tuple).collect())
    }

    /// Active records of an identity, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active_for_user(&self, user_id: Uuid) -> StorageResult<Vec<RefreshTokenRow>> {
        let rows: Vec<RefreshTokenTuple> = query_as(
            r#"
            SELECT id, user_id, lookup_id, token_hash, issued_at, revoked_at, origin, user_agent
            FROM refresh_token
            WHERE user_id = $1
              AND revoked_at IS NULL
            ORDER BY issued_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(RefreshTokenRow::from_tuple).collect())
    }

    /// Revoke one record if still active.
    ///
    /// Returns `true` only for the call that performed the revocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn revoke(&self, id: Uuid, at: OffsetDateTime) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE refresh_token
            SET revoked_at = $2
            WHERE id = $1
              AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Revoke every active record of an identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn revoke_all_for_user(&self, user_id: Uuid, at: OffsetDateTime) -> StorageResult<u64> {
        let result = query(
            r#"
            UPDATE refresh_token
            SET revoked_at = $2
            WHERE user_id = $1
              AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(at)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete records issued before `cutoff`, revoked or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_issued_before(&self, cutoff: OffsetDateTime) -> StorageResult<u64> {
        let result = query(
            r#"
            DELETE FROM refresh_token
            WHERE issued_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
