//! Credential storage trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::Credential;

/// Storage for credentials.
#[async_trait]
pub trait CredentialStorage: Send + Sync {
    /// Finds the active credential whose username or email equals `login`.
    ///
    /// Emails compare case-insensitively. When one credential's username
    /// and another's email both match, the username match wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_active_by_login(&self, login: &str) -> AuthResult<Option<Credential>>;

    /// Finds a credential by identity id, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Credential>>;

    /// Stores a new credential.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if an active credential already owns
    /// the username or email.
    async fn create(&self, credential: &Credential) -> AuthResult<()>;

    /// Replaces the password digest.
    ///
    /// Returns `false` if no credential has this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool>;
}
