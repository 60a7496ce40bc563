//! Role-based permission resolution.
//!
//! Effective permissions are the union of the grants of every role assigned
//! to an identity. Resolution always reads current assignments; nothing is
//! cached between requests.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::AuthResult;
use crate::storage::RoleStorage;

/// Resolves roles and permissions for an identity.
#[derive(Clone)]
pub struct PermissionResolver {
    storage: Arc<dyn RoleStorage>,
}

impl PermissionResolver {
    #[must_use]
    pub fn new(storage: Arc<dyn RoleStorage>) -> Self {
        Self { storage }
    }

    /// Current role names of the identity.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn roles(&self, user_id: Uuid) -> AuthResult<Vec<String>> {
        self.storage.roles_for(user_id).await
    }

    /// Deduplicated union of permissions over the identity's roles.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn resolve(&self, user_id: Uuid) -> AuthResult<BTreeSet<String>> {
        let roles = self.storage.roles_for(user_id).await?;
        if roles.is_empty() {
            return Ok(BTreeSet::new());
        }
        Ok(self
            .storage
            .permissions_for_roles(&roles)
            .await?
            .into_iter()
            .collect())
    }

    /// Returns `true` if every permission in `required` is held.
    ///
    /// An empty `required` always passes.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn has_all<S: AsRef<str>>(&self, user_id: Uuid, required: &[S]) -> AuthResult<bool> {
        Ok(self.missing(user_id, required).await?.is_empty())
    }

    /// Required permissions the identity lacks, in the order given.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn missing<S: AsRef<str>>(
        &self,
        user_id: Uuid,
        required: &[S],
    ) -> AuthResult<Vec<String>> {
        if required.is_empty() {
            return Ok(Vec::new());
        }
        let granted = self.resolve(user_id).await?;
        Ok(missing_permissions(&granted, required))
    }
}

/// Elements of `required` not present in `granted`.
#[must_use]
pub fn missing_permissions<S: AsRef<str>>(granted: &BTreeSet<String>, required: &[S]) -> Vec<String> {
    required
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| !granted.contains(*p))
        .map(str::to_string)
        .collect()
}
