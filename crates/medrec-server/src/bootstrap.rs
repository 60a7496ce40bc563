//! Startup bootstrap for the initial administrator.
//!
//! Grants the admin role the permissions needed to manage other users'
//! sessions and registers the configured credential. Safe to run on every
//! start: an existing credential is left untouched.

use std::sync::Arc;

use medrec_auth::http::SESSIONS_REVOKE;
use medrec_auth::{AuthError, AuthService, RoleStorage};
use tracing::{info, warn};

use crate::config::AdminUserConfig;

/// Role given to the bootstrap administrator.
pub const ADMIN_ROLE: &str = "Admin";

/// Permissions granted to [`ADMIN_ROLE`].
const ADMIN_PERMISSIONS: &[&str] = &[SESSIONS_REVOKE];

/// Outcome of [`bootstrap_admin_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    AlreadyExists,
}

/// Ensures the admin role has its permissions and the admin credential exists.
///
/// # Errors
///
/// Returns an error if storage fails or the configured password is rejected
/// by the strength rules.
pub async fn bootstrap_admin_user(
    service: &AuthService,
    roles: &Arc<dyn RoleStorage>,
    admin: &AdminUserConfig,
) -> Result<BootstrapOutcome, AuthError> {
    for permission in ADMIN_PERMISSIONS {
        roles.grant_permission(ADMIN_ROLE, permission).await?;
    }

    let email = admin.email();
    match service
        .register_credential(
            &admin.username,
            &email,
            &admin.password,
            &[ADMIN_ROLE.to_string()],
        )
        .await
    {
        Ok(identity) => {
            info!(user_id = %identity.id, username = %admin.username, "Admin credential created");
            Ok(BootstrapOutcome::Created)
        }
        Err(AuthError::Conflict { .. }) => {
            info!(username = %admin.username, "Admin credential already exists, skipping");
            Ok(BootstrapOutcome::AlreadyExists)
        }
        Err(e) => {
            warn!(username = %admin.username, error = %e, "Admin bootstrap failed");
            Err(e)
        }
    }
}
