//! Authentication orchestration.
//!
//! [`AuthService`] composes the hasher, token issuer, refresh token store,
//! lockout tracker and permission resolver into the login, refresh and
//! logout flows, plus credential registration, password change and session
//! management.
//!
//! # Failure uniformity
//!
//! Both failed-login paths (unknown identifier, wrong password) perform one
//! Argon2 verification, count a failed attempt, sleep for the configured
//! failure delay and return `InvalidCredentials` with the remaining attempt
//! count. Neither content nor latency says which factor was wrong.
//!
//! # Rotation
//!
//! Refresh revokes the consumed record with a conditional write before
//! anything is issued. When two requests present the same secret
//! concurrently, exactly one wins the revoke; the other fails as if the
//! secret were unknown.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::device::UNKNOWN_ORIGIN;
use crate::error::AuthError;
use crate::lockout::{LockoutStore, LockoutTracker};
use crate::password::{PasswordHasher, is_common, validate_strength};
use crate::permission::PermissionResolver;
use crate::refresh::RefreshTokenStore;
use crate::storage::{CredentialStorage, RefreshTokenStorage, RoleStorage};
use crate::token::TokenIssuer;
use crate::types::{Credential, DeviceMetadata, Identity, SessionSummary};

/// Access/refresh pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    /// Opaque 128-hex refresh secret.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub user: Identity,
}

/// Storage backends used by [`AuthService`].
#[derive(Clone)]
pub struct AuthStorages {
    pub credentials: Arc<dyn CredentialStorage>,
    pub roles: Arc<dyn RoleStorage>,
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
}

/// Login, refresh and logout flows.
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStorage>,
    roles: Arc<dyn RoleStorage>,
    permissions: PermissionResolver,
    refresh_tokens: RefreshTokenStore,
    lockout: LockoutTracker,
    issuer: Arc<TokenIssuer>,
    hasher: PasswordHasher,
    failure_delay: Duration,
    trusted_proxies: Arc<[IpAddr]>,
}

impl AuthService {
    /// Builds the service from configuration and backends.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the configuration is invalid,
    /// including a signing secret shorter than 32 bytes.
    pub fn new(
        config: &AuthConfig,
        storages: AuthStorages,
        lockout_store: Arc<dyn LockoutStore>,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let issuer = Arc::new(TokenIssuer::from_config(config)?);
        let hasher = PasswordHasher::new(&config.password)
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        Ok(Self {
            credentials: storages.credentials,
            permissions: PermissionResolver::new(storages.roles.clone()),
            roles: storages.roles,
            refresh_tokens: RefreshTokenStore::new(
                storages.refresh_tokens,
                hasher.clone(),
                config.tokens.refresh_token_lifetime,
            ),
            lockout: LockoutTracker::new(lockout_store, &config.lockout),
            issuer,
            hasher,
            failure_delay: config.failure_delay,
            trusted_proxies: config.trusted_proxies.iter().copied().collect(),
        })
    }

    /// Token issuer, shared with the authentication guard.
    #[must_use]
    pub fn issuer(&self) -> Arc<TokenIssuer> {
        self.issuer.clone()
    }

    /// Permission resolver, shared with the permission guard.
    #[must_use]
    pub fn permissions(&self) -> &PermissionResolver {
        &self.permissions
    }

    /// Lockout tracker.
    #[must_use]
    pub fn lockout(&self) -> &LockoutTracker {
        &self.lockout
    }

    /// Refresh token store.
    #[must_use]
    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    /// Peers whose forwarding headers are honored.
    #[must_use]
    pub fn trusted_proxies(&self) -> Arc<[IpAddr]> {
        self.trusted_proxies.clone()
    }

    // ========================================================================
    // Login
    // ========================================================================

    /// Exchanges username (or email) and password for a token pair.
    ///
    /// # Errors
    ///
    /// - `AccountLocked` if the (identifier, origin) pair is locked; no
    ///   credential check is performed. At most `max_attempts` checks run
    ///   per lockout period, however many requests arrive at once
    /// - `InvalidCredentials` with the remaining attempts otherwise
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        device: DeviceMetadata,
    ) -> AuthResult<TokenPair> {
        let origin = device.origin.as_deref().unwrap_or(UNKNOWN_ORIGIN).to_string();

        // Counted before the password check so concurrent guesses cannot
        // all slip past the lock.
        let status = self.lockout.reserve_failure(username, &origin).await?;
        if status.locked
            && let Some(unlock_at) = status.unlock_at
        {
            tracing::warn!(
                identifier = %username,
                origin = %origin,
                unlock_at = %unlock_at,
                "Login rejected: locked out"
            );
            return Err(AuthError::account_locked(unlock_at));
        }

        let credential = self.credentials.find_active_by_login(username).await?;

        let verified = match &credential {
            Some(c) => self.hasher.verify_async(password, &c.password_hash).await,
            None => {
                self.hasher.verify_dummy_async(password).await;
                false
            }
        };

        let Some(credential) = credential.filter(|_| verified) else {
            let remaining = status.remaining_attempts.unwrap_or(0);
            tracing::warn!(
                identifier = %username,
                origin = %origin,
                remaining_attempts = remaining,
                "Login failed"
            );
            tokio::time::sleep(self.failure_delay).await;
            return Err(AuthError::invalid_credentials_with_remaining(remaining));
        };

        self.lockout.clear_attempts(username, &origin).await?;

        let identity = self.identity_for(&credential).await?;
        let pair = self.issue_pair(identity, device).await?;

        tracing::info!(
            user_id = %credential.id,
            username = %credential.username,
            origin = %origin,
            "Login succeeded"
        );
        Ok(pair)
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Rotates a refresh secret into a new token pair.
    ///
    /// The presented secret is unusable afterwards whether or not the rest
    /// of the flow succeeds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` if the secret is malformed, unknown,
    /// revoked, expired, already consumed by a concurrent refresh, or its
    /// owner is no longer active.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: DeviceMetadata,
    ) -> AuthResult<TokenPair> {
        let Some(record) = self.refresh_tokens.match_secret(refresh_token, None).await? else {
            tracing::debug!("Refresh rejected: no matching active token");
            return Err(AuthError::invalid_credentials());
        };

        if !self.refresh_tokens.revoke(record.id).await? {
            tracing::warn!(
                user_id = %record.user_id,
                token_id = %record.id,
                "Refresh rejected: token consumed concurrently"
            );
            return Err(AuthError::invalid_credentials());
        }

        let credential = match self.credentials.find_by_id(record.user_id).await? {
            Some(c) if c.active => c,
            _ => {
                tracing::warn!(user_id = %record.user_id, "Refresh rejected: credential inactive");
                return Err(AuthError::invalid_credentials());
            }
        };

        let identity = self.identity_for(&credential).await?;
        let pair = self.issue_pair(identity, device).await?;

        tracing::info!(
            user_id = %credential.id,
            rotated_from = %record.id,
            "Refresh token rotated"
        );
        Ok(pair)
    }

    // ========================================================================
    // Logout
    // ========================================================================

    /// Revokes refresh tokens of the identity. Returns how many were revoked.
    ///
    /// With `all_devices == false` and a presented refresh secret owned by
    /// this identity, only that record is revoked. In every other case all
    /// records of the identity are revoked.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn logout(
        &self,
        user_id: Uuid,
        all_devices: bool,
        refresh_token: Option<&str>,
    ) -> AuthResult<u64> {
        if !all_devices
            && let Some(secret) = refresh_token
            && let Some(record) = self.refresh_tokens.match_secret(secret, Some(user_id)).await?
        {
            let revoked = u64::from(self.refresh_tokens.revoke(record.id).await?);
            tracing::info!(user_id = %user_id, token_id = %record.id, "Logged out one session");
            return Ok(revoked);
        }

        let revoked = self.refresh_tokens.revoke_all(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Logged out all sessions");
        Ok(revoked)
    }

    // ========================================================================
    // Identity and sessions
    // ========================================================================

    /// Current identity summary with freshly resolved roles.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` if the credential no longer exists or is
    /// inactive.
    pub async fn me(&self, user_id: Uuid) -> AuthResult<Identity> {
        match self.credentials.find_by_id(user_id).await? {
            Some(c) if c.active => self.identity_for(&c).await,
            _ => Err(AuthError::unauthenticated("credential no longer active")),
        }
    }

    /// Active sessions of the identity.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn list_sessions(&self, user_id: Uuid) -> AuthResult<Vec<SessionSummary>> {
        self.refresh_tokens.list_active(user_id).await
    }

    /// Revokes every session of an identity on behalf of an administrator.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn revoke_sessions(&self, actor: Uuid, user_id: Uuid) -> AuthResult<u64> {
        let revoked = self.refresh_tokens.revoke_all(user_id).await?;
        tracing::info!(
            actor = %actor,
            user_id = %user_id,
            revoked,
            "Sessions revoked by administrator"
        );
        Ok(revoked)
    }

    // ========================================================================
    // Credential management
    // ========================================================================

    /// Creates a credential and assigns roles.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty username/email or a weak or common
    ///   password
    /// - `Conflict` if the username or email is taken
    pub async fn register_credential(
        &self,
        username: &str,
        email: &str,
        password: &str,
        roles: &[String],
    ) -> AuthResult<Identity> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() {
            return Err(AuthError::invalid_request("username and email are required"));
        }
        check_password(password)?;

        let password_hash = self
            .hasher
            .hash_async(password)
            .await
            .map_err(|e| AuthError::internal(e.to_string()))?;
        let credential = Credential::new(username, email, password_hash);
        self.credentials.create(&credential).await?;

        for role in roles {
            self.roles.assign_role(credential.id, role).await?;
        }

        tracing::info!(
            user_id = %credential.id,
            username = %username,
            roles = ?roles,
            "Credential registered"
        );
        self.identity_for(&credential).await
    }

    /// Replaces the password and revokes every refresh token of the identity.
    ///
    /// Returns how many sessions were revoked.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` if `current_password` is wrong
    /// - `InvalidRequest` if `new_password` is weak or common
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<u64> {
        let credential = match self.credentials.find_by_id(user_id).await? {
            Some(c) if c.active => c,
            _ => return Err(AuthError::unauthenticated("credential no longer active")),
        };
        if !self
            .hasher
            .verify_async(current_password, &credential.password_hash)
            .await
        {
            tokio::time::sleep(self.failure_delay).await;
            return Err(AuthError::invalid_credentials());
        }
        check_password(new_password)?;

        let password_hash = self
            .hasher
            .hash_async(new_password)
            .await
            .map_err(|e| AuthError::internal(e.to_string()))?;
        if !self
            .credentials
            .update_password_hash(user_id, &password_hash)
            .await?
        {
            return Err(AuthError::unauthenticated("credential no longer exists"));
        }

        let revoked = self.refresh_tokens.revoke_all(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Password changed, sessions revoked");
        Ok(revoked)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Deletes refresh records older than the refresh lifetime.
    ///
    /// # Errors
    ///
    /// Returns storage errors as-is.
    pub async fn purge_expired_tokens(&self) -> AuthResult<u64> {
        self.refresh_tokens
            .purge_expired(self.issuer.refresh_ttl())
            .await
    }

    /// Drops idle lockout buckets.
    ///
    /// # Errors
    ///
    /// Returns lockout store errors as-is.
    pub async fn sweep_lockouts(&self) -> AuthResult<u64> {
        self.lockout.sweep().await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn identity_for(&self, credential: &Credential) -> AuthResult<Identity> {
        Ok(Identity {
            id: credential.id,
            username: credential.username.clone(),
            email: credential.email.clone(),
            roles: self.permissions.roles(credential.id).await?,
        })
    }

    async fn issue_pair(
        &self,
        identity: Identity,
        device: DeviceMetadata,
    ) -> AuthResult<TokenPair> {
        let claims = self
            .issuer
            .claims_for(&identity, time::OffsetDateTime::now_utc());
        let access_token = self.issuer.sign_access(&claims)?;
        let refresh_token = self.issuer.new_refresh_secret();
        self.refresh_tokens
            .store(identity.id, &refresh_token, device)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.issuer.access_ttl().as_secs(),
            user: identity,
        })
    }
}

fn check_password(password: &str) -> AuthResult<()> {
    let report = validate_strength(password);
    if !report.valid {
        return Err(AuthError::invalid_request(format!(
            "password rejected: {}",
            report.summary()
        )));
    }
    if is_common(password) {
        return Err(AuthError::invalid_request("password rejected: too common"));
    }
    Ok(())
}
