//! Arc-owning storage adapters.
//!
//! These adapters wrap the lifetime-based storage types and own an
//! `Arc<PgPool>`, so they can be handed to `AuthService` as
//! `Arc<dyn Storage>`.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use medrec_auth::AuthResult;
use medrec_auth::storage::{
    CredentialStorage as CredentialStorageTrait, RefreshTokenStorage as RefreshTokenStorageTrait,
    RoleStorage as RoleStorageTrait,
};
use medrec_auth::types::{Credential, RefreshTokenRecord};

use crate::PgPool;
use crate::credential::CredentialStorage;
use crate::refresh_token::RefreshTokenStorage;
use crate::role::RoleStorage;

// =============================================================================
// Arc-Owning Credential Storage
// =============================================================================

/// Arc-owning PostgreSQL credential storage adapter.
#[derive(Clone)]
pub struct ArcCredentialStorage {
    pool: Arc<PgPool>,
}

impl ArcCredentialStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStorageTrait for ArcCredentialStorage {
    async fn find_active_by_login(&self, login: &str) -> AuthResult<Option<Credential>> {
        let storage = CredentialStorage::new(&self.pool);
        Ok(storage.find_active_by_login(login).await?.map(Credential::from))
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Credential>> {
        let storage = CredentialStorage::new(&self.pool);
        Ok(storage.find_by_id(id).await?.map(Credential::from))
    }

    async fn create(&self, credential: &Credential) -> AuthResult<()> {
        let storage = CredentialStorage::new(&self.pool);
        Ok(storage.create(credential).await?)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool> {
        let storage = CredentialStorage::new(&self.pool);
        Ok(storage.update_password_hash(id, password_hash).await?)
    }
}

// =============================================================================
// Arc-Owning Role Storage
// =============================================================================

/// Arc-owning PostgreSQL role storage adapter.
#[derive(Clone)]
pub struct ArcRoleStorage {
    pool: Arc<PgPool>,
}

impl ArcRoleStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStorageTrait for ArcRoleStorage {
    async fn roles_for(&self, user_id: Uuid) -> AuthResult<Vec<String>> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.roles_for(user_id).await?)
    }

    async fn permissions_for_roles(&self, roles: &[String]) -> AuthResult<Vec<String>> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.permissions_for_roles(roles).await?)
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> AuthResult<()> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.assign_role(user_id, role).await?)
    }

    async fn unassign_role(&self, user_id: Uuid, role: &str) -> AuthResult<bool> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.unassign_role(user_id, role).await?)
    }

    async fn grant_permission(&self, role: &str, permission: &str) -> AuthResult<()> {
        let storage = RoleStorage::new(&self.pool);
        Ok(storage.grant_permission(role, permission).await?)
    }
}

// =============================================================================
// Arc-Owning Refresh Token Storage
// =============================================================================

/// Arc-owning PostgreSQL refresh token storage adapter.
#[derive(Clone)]
pub struct ArcRefreshTokenStorage {
    pool: Arc<PgPool>,
}

impl ArcRefreshTokenStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStorageTrait for ArcRefreshTokenStorage {
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        let storage = RefreshTokenStorage::new(&self.pool);
        Ok(storage.create(record).await?)
    }

    async fn find_active_by_lookup(
        &self,
        lookup_id: &str,
        user_id: Option<Uuid>,
    ) -> AuthResult<Vec<RefreshTokenRecord>> {
        let storage = RefreshTokenStorage::new(&self.pool);
        let rows = storage.find_active_by_lookup(lookup_id, user_id).await?;
        Ok(rows.into_iter().map(RefreshTokenRecord::from).collect())
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> AuthResult<Vec<RefreshTokenRecord>> {
        let storage = RefreshTokenStorage::new(&self.pool);
        let rows = storage.list_active_for_user(user_id).await?;
        Ok(rows.into_iter().map(RefreshTokenRecord::from).collect())
    }

    async fn revoke(&self, id: Uuid, at: OffsetDateTime) -> AuthResult<bool> {
        let storage = RefreshTokenStorage::new(&self.pool);
        Ok(storage.revoke(id, at).await?)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: OffsetDateTime) -> AuthResult<u64> {
        let storage = RefreshTokenStorage::new(&self.pool);
        Ok(storage.revoke_all_for_user(user_id, at).await?)
    }

    async fn delete_issued_before(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
        let storage = RefreshTokenStorage::new(&self.pool);
        Ok(storage.delete_issued_before(cutoff).await?)
    }
}
