//! In-process storage backends.
//!
//! Each store keeps its data behind a `parking_lot::RwLock`; every trait
//! method takes the lock once, so check-then-write sequences (uniqueness on
//! create, conditional revoke) are atomic with respect to each other.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{CredentialStorage, RefreshTokenStorage, RoleStorage};
use crate::types::{Credential, RefreshTokenRecord};

// ============================================================================
// Credentials
// ============================================================================

/// In-memory [`CredentialStorage`].
#[derive(Debug, Default)]
pub struct InMemoryCredentialStorage {
    credentials: RwLock<HashMap<Uuid, Credential>>,
}

impl InMemoryCredentialStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStorage for InMemoryCredentialStorage {
    async fn find_active_by_login(&self, login: &str) -> AuthResult<Option<Credential>> {
        let credentials = self.credentials.read();
        let active = || credentials.values().filter(|c| c.active);
        Ok(active()
            .find(|c| c.username == login)
            .or_else(|| active().find(|c| c.matches_login(login)))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Credential>> {
        Ok(self.credentials.read().get(&id).cloned())
    }

    async fn create(&self, credential: &Credential) -> AuthResult<()> {
        let mut credentials = self.credentials.write();
        if credentials.contains_key(&credential.id) {
            return Err(AuthError::conflict("credential id already exists"));
        }
        if credential.active {
            let taken = credentials.values().any(|c| {
                c.active
                    && (c.username == credential.username
                        || c.email.eq_ignore_ascii_case(&credential.email))
            });
            if taken {
                return Err(AuthError::conflict("username or email already in use"));
            }
        }
        credentials.insert(credential.id, credential.clone());
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool> {
        let mut credentials = self.credentials.write();
        match credentials.get_mut(&id) {
            Some(c) => {
                c.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Roles
// ============================================================================

#[derive(Debug, Default)]
struct RoleTables {
    assignments: HashMap<Uuid, BTreeSet<String>>,
    grants: HashMap<String, BTreeSet<String>>,
}

/// In-memory [`RoleStorage`].
#[derive(Debug, Default)]
pub struct InMemoryRoleStorage {
    tables: RwLock<RoleTables>,
}

impl InMemoryRoleStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStorage for InMemoryRoleStorage {
    async fn roles_for(&self, user_id: Uuid) -> AuthResult<Vec<String>> {
        let tables = self.tables.read();
        Ok(tables
            .assignments
            .get(&user_id)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn permissions_for_roles(&self, roles: &[String]) -> AuthResult<Vec<String>> {
        let tables = self.tables.read();
        let permissions: BTreeSet<&String> = roles
            .iter()
            .filter_map(|role| tables.grants.get(role))
            .flatten()
            .collect();
        Ok(permissions.into_iter().cloned().collect())
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> AuthResult<()> {
        self.tables
            .write()
            .assignments
            .entry(user_id)
            .or_default()
            .insert(role.to_string());
        Ok(())
    }

    async fn unassign_role(&self, user_id: Uuid, role: &str) -> AuthResult<bool> {
        let mut tables = self.tables.write();
        Ok(tables
            .assignments
            .get_mut(&user_id)
            .is_some_and(|roles| roles.remove(role)))
    }

    async fn grant_permission(&self, role: &str, permission: &str) -> AuthResult<()> {
        self.tables
            .write()
            .grants
            .entry(role.to_string())
            .or_default()
            .insert(permission.to_string());
        Ok(())
    }
}

// ============================================================================
// Refresh tokens
// ============================================================================

/// In-memory [`RefreshTokenStorage`].
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStorage {
    records: RwLock<HashMap<Uuid, RefreshTokenRecord>>,
}

impl InMemoryRefreshTokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, revoked included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RefreshTokenStorage for InMemoryRefreshTokenStorage {
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(AuthError::conflict("refresh token id already exists"));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_active_by_lookup(
        &self,
        lookup_id: &str,
        user_id: Option<Uuid>,
    ) -> AuthResult<Vec<RefreshTokenRecord>> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|r| r.is_active() && r.lookup_id == lookup_id)
            .filter(|r| user_id.is_none_or(|u| r.user_id == u))
            .cloned()
            .collect())
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> AuthResult<Vec<RefreshTokenRecord>> {
        let records = self.records.read();
        let mut active: Vec<_> = records
            .values()
            .filter(|r| r.is_active() && r.user_id == user_id)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(active)
    }

    async fn revoke(&self, id: Uuid, at: OffsetDateTime) -> AuthResult<bool> {
        let mut records = self.records.write();
        match records.get_mut(&id) {
            Some(r) if r.revoked_at.is_none() => {
                r.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: OffsetDateTime) -> AuthResult<u64> {
        let mut records = self.records.write();
        let mut count = 0;
        for r in records
            .values_mut()
            .filter(|r| r.user_id == user_id && r.revoked_at.is_none())
        {
            r.revoked_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn delete_issued_before(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.issued_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceMetadata;
    use time::Duration;

    fn record(user_id: Uuid, lookup: &str, issued_at: OffsetDateTime) -> RefreshTokenRecord {
        RefreshTokenRecord::new(
            user_id,
            lookup,
            "$argon2id$x",
            DeviceMetadata::default(),
            issued_at,
        )
    }

    #[tokio::test]
    async fn test_username_match_wins_over_email_match() {
        let storage = InMemoryCredentialStorage::new();
        let by_email = Credential::new("ward.clerk", "rounds@st-elsewhere.org", "h");
        let by_name = Credential::new("rounds@st-elsewhere.org", "charge@st-elsewhere.org", "h");
        storage.create(&by_email).await.unwrap();
        storage.create(&by_name).await.unwrap();

        for _ in 0..8 {
            let found = storage
                .find_active_by_login("rounds@st-elsewhere.org")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.id, by_name.id);
        }
        let found = storage
            .find_active_by_login("ROUNDS@st-elsewhere.org")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, by_email.id);
    }

    #[tokio::test]
    async fn test_credential_uniqueness() {
        let storage = InMemoryCredentialStorage::new();
        let first = Credential::new("alice", "alice@example.org", "h");
        storage.create(&first).await.unwrap();

        let same_name = Credential::new("alice", "other@example.org", "h");
        assert!(matches!(
            storage.create(&same_name).await,
            Err(AuthError::Conflict { .. })
        ));

        let same_email = Credential::new("alice2", "ALICE@example.org", "h");
        assert!(matches!(
            storage.create(&same_email).await,
            Err(AuthError::Conflict { .. })
        ));

        let mut inactive = Credential::new("alice", "alice@example.org", "h");
        inactive.active = false;
        storage.create(&inactive).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_active_by_login() {
        let storage = InMemoryCredentialStorage::new();
        let mut retired = Credential::new("bob", "bob@example.org", "old");
        retired.active = false;
        storage.create(&retired).await.unwrap();
        assert!(storage.find_active_by_login("bob").await.unwrap().is_none());

        let current = Credential::new("bob", "bob@example.org", "new");
        storage.create(&current).await.unwrap();
        let found = storage
            .find_active_by_login("BOB@example.org")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, current.id);
    }

    #[tokio::test]
    async fn test_update_password_hash() {
        let storage = InMemoryCredentialStorage::new();
        let cred = Credential::new("carol", "carol@example.org", "old");
        storage.create(&cred).await.unwrap();
        assert!(storage.update_password_hash(cred.id, "new").await.unwrap());
        assert_eq!(
            storage.find_by_id(cred.id).await.unwrap().unwrap().password_hash,
            "new"
        );
        assert!(!storage.update_password_hash(Uuid::new_v4(), "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_role_union() {
        let storage = InMemoryRoleStorage::new();
        let user = Uuid::new_v4();
        storage.assign_role(user, "Doctor").await.unwrap();
        storage.assign_role(user, "Researcher").await.unwrap();
        storage.assign_role(user, "Doctor").await.unwrap();
        storage.grant_permission("Doctor", "patients:read").await.unwrap();
        storage.grant_permission("Doctor", "prescriptions:write").await.unwrap();
        storage.grant_permission("Researcher", "patients:read").await.unwrap();
        storage.grant_permission("Admin", "users:manage").await.unwrap();

        let roles = storage.roles_for(user).await.unwrap();
        assert_eq!(roles, vec!["Doctor", "Researcher"]);
        let permissions = storage.permissions_for_roles(&roles).await.unwrap();
        assert_eq!(permissions, vec!["patients:read", "prescriptions:write"]);

        assert!(storage.unassign_role(user, "Researcher").await.unwrap());
        assert!(!storage.unassign_role(user, "Researcher").await.unwrap());
        assert_eq!(storage.roles_for(user).await.unwrap(), vec!["Doctor"]);
    }

    #[tokio::test]
    async fn test_revoke_reports_single_winner() {
        let storage = InMemoryRefreshTokenStorage::new();
        let r = record(Uuid::new_v4(), "lookup", OffsetDateTime::now_utc());
        storage.create(&r).await.unwrap();

        let now = OffsetDateTime::now_utc();
        assert!(storage.revoke(r.id, now).await.unwrap());
        assert!(!storage.revoke(r.id, now).await.unwrap());
        assert!(!storage.revoke(Uuid::new_v4(), now).await.unwrap());
        assert!(
            storage
                .find_active_by_lookup("lookup", None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_lookup_scoped_to_user() {
        let storage = InMemoryRefreshTokenStorage::new();
        let owner = Uuid::new_v4();
        storage
            .create(&record(owner, "shared", OffsetDateTime::now_utc()))
            .await
            .unwrap();

        assert_eq!(
            storage.find_active_by_lookup("shared", None).await.unwrap().len(),
            1
        );
        assert_eq!(
            storage
                .find_active_by_lookup("shared", Some(owner))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(
            storage
                .find_active_by_lookup("shared", Some(Uuid::new_v4()))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_revoke_all_and_purge() {
        let storage = InMemoryRefreshTokenStorage::new();
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let old = record(user, "a", now - Duration::days(10));
        let fresh = record(user, "b", now);
        let other = record(Uuid::new_v4(), "c", now);
        for r in [&old, &fresh, &other] {
            storage.create(r).await.unwrap();
        }

        assert_eq!(storage.revoke_all_for_user(user, now).await.unwrap(), 2);
        assert_eq!(storage.revoke_all_for_user(user, now).await.unwrap(), 0);
        assert!(storage.list_active_for_user(user).await.unwrap().is_empty());
        assert_eq!(storage.list_active_for_user(other.user_id).await.unwrap().len(), 1);

        let purged = storage
            .delete_issued_before(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(storage.len(), 2);
    }
}
