//! Role assignment and permission grant storage trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;

/// Storage for identity-to-role assignments and role-to-permission grants.
///
/// Both relations are many-to-many and idempotent: assigning an existing
/// pair is a no-op.
#[async_trait]
pub trait RoleStorage: Send + Sync {
    /// Role names assigned to the identity, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn roles_for(&self, user_id: Uuid) -> AuthResult<Vec<String>>;

    /// Permission names granted to any of `roles`, deduplicated.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn permissions_for_roles(&self, roles: &[String]) -> AuthResult<Vec<String>>;

    /// Assigns a role to an identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn assign_role(&self, user_id: Uuid, role: &str) -> AuthResult<()>;

    /// Removes a role from an identity. Returns `false` if it was not assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn unassign_role(&self, user_id: Uuid, role: &str) -> AuthResult<bool>;

    /// Grants a permission to a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn grant_permission(&self, role: &str, permission: &str) -> AuthResult<()>;
}
