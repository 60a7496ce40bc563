//! Role assignment and role-permission grant storage.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use uuid::Uuid;

use crate::{PgPool, StorageError, StorageResult};

/// Role storage operations.
///
/// Backed by the `role_assignment` (identity to role) and `role_permission`
/// (role to permission) tables.
pub struct RoleStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> RoleStorage<'a> {
    /// Create a new role storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Role names assigned to an identity, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn roles_for(&self, user_id: Uuid) -> StorageResult<Vec<String>> {
        let rows: Vec<(String,)> = query_as(
            r#"
            SELECT role
            FROM role_assignment
            WHERE user_id = $1
            ORDER BY role
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(role,)| role).collect())
    }

    /// Distinct permissions granted to any of `roles`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn permissions_for_roles(&self, roles: &[String]) -> StorageResult<Vec<String>> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String,)> = query_as(
            r#"
            SELECT DISTINCT permission
            FROM role_permission
            WHERE role = ANY($1)
            ORDER BY permission
            "#,
        )
        .bind(roles)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(permission,)| permission).collect())
    }

    /// Assign a role. Assigning a role twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the identity does not exist.
    pub async fn assign_role(&self, user_id: Uuid, role: &str) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO role_assignment (user_id, role)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx_core::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return StorageError::not_found(format!("Credential {user_id}"));
            }
            StorageError::from(e)
        })?;

        Ok(())
    }

    /// Remove a role assignment. Returns `false` if it was not assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn unassign_role(&self, user_id: Uuid, role: &str) -> StorageResult<bool> {
        let result = query(
            r#"
            DELETE FROM role_assignment
            WHERE user_id = $1 AND role = $2
            "#,
        )
        .bind(user_id)
        .bind(role)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Grant a permission to a role. Granting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn grant_permission(&self, role: &str, permission: &str) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO role_permission (role, permission)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role)
        .bind(permission)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}
