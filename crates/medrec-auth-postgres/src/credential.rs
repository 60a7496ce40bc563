//! Credential storage.
//!
//! Uniqueness of username and (case-insensitive) email among active
//! credentials is enforced by partial unique indexes.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use medrec_auth::types::Credential;

use crate::{PgPool, StorageResult, conflict_on_unique};

// =============================================================================
// Types
// =============================================================================

type CredentialTuple = (Uuid, String, String, String, bool, OffsetDateTime);

/// Credential record from database.
#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

impl CredentialRow {
    fn from_tuple(row: CredentialTuple) -> Self {
        Self {
            id: row.0,
            username: row.1,
            email: row.2,
            password_hash: row.3,
            active: row.4,
            created_at: row.5,
        }
    }
}

impl From<CredentialRow> for Credential {
    fn from(row: CredentialRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Credential Storage
// =============================================================================

const FIND_ACTIVE_BY_LOGIN: &str = r#"
    SELECT id, username, email, password_hash, active, created_at
    FROM credential
    WHERE active
      AND (username = $1 OR lower(email) = lower($1))
    ORDER BY (username = $1) DESC, created_at
    LIMIT 1
"#;

/// Credential storage operations.
pub struct CredentialStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> CredentialStorage<'a> {
    /// Create a new credential storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find the active credential whose username equals `login` or whose
    /// email equals it ignoring case. A username match wins over an email
    /// match on another row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_active_by_login(&self, login: &str) -> StorageResult<Option<CredentialRow>> {
        let row: Option<CredentialTuple> = query_as(FIND_ACTIVE_BY_LOGIN)
            .bind(login)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(CredentialRow::from_tuple))
    }

    /// Find a credential by id, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<CredentialRow>> {
        let row: Option<CredentialTuple> = query_as(
            r#"
            SELECT id, username, email, password_hash, active, created_at
            FROM credential
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(CredentialRow::from_tuple))
    }

    /// Insert a credential.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if an active credential already owns
    /// the username or email.
    pub async fn create(&self, credential: &Credential) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO credential (id, username, email, password_hash, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(credential.id)
        .bind(&credential.username)
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(credential.active)
        .bind(credential.created_at)
        .execute(self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!(
                    "username '{}' or its email is already in use",
                    credential.username
                )
            })
        })?;

        Ok(())
    }

    /// Replace the password digest.
    ///
    /// Returns `false` if no credential has this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE credential
            SET password_hash = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deactivate a credential, releasing its username and email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn deactivate(&self, id: Uuid) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE credential
            SET active = FALSE
            WHERE id = $1 AND active
            "#,
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
