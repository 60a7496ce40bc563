//! Per-request authentication and permission checks.
//!
//! Transport-independent: the axum extractors and middleware in
//! [`crate::middleware`] call into these.

use std::sync::Arc;

use crate::AuthResult;
use crate::error::AuthError;
use crate::permission::PermissionResolver;
use crate::token::TokenIssuer;
use crate::types::Identity;

/// Pulls the token out of an `Authorization` header value.
///
/// Accepts `Bearer <token>` (scheme case-insensitive) or a bare token.
#[must_use]
pub fn extract_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}

/// Verifies access tokens and produces the request identity.
#[derive(Clone)]
pub struct AuthenticationGuard {
    issuer: Arc<TokenIssuer>,
}

impl AuthenticationGuard {
    #[must_use]
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }

    /// Authenticates from a raw `Authorization` header value.
    ///
    /// Every failure becomes `Unauthenticated`; whether the token was
    /// missing, expired or invalid is only logged.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` on any failure.
    pub fn authenticate(&self, authorization: Option<&str>) -> AuthResult<Identity> {
        let Some(token) = extract_token(authorization) else {
            tracing::debug!("Authentication failed: no token");
            return Err(AuthError::unauthenticated("missing access token"));
        };

        let claims = self.issuer.verify_access(token).map_err(|e| {
            tracing::debug!(kind = e.kind(), error = %e, "Authentication failed");
            AuthError::unauthenticated("invalid or expired access token")
        })?;

        Identity::try_from(claims).map_err(|e| {
            tracing::warn!(error = %e, "Authentication failed: malformed subject");
            AuthError::unauthenticated("invalid or expired access token")
        })
    }
}

/// Enforces the permissions declared on an operation.
#[derive(Clone)]
pub struct PermissionGuard {
    resolver: PermissionResolver,
}

impl PermissionGuard {
    #[must_use]
    pub fn new(resolver: PermissionResolver) -> Self {
        Self { resolver }
    }

    /// Allows when `required` is empty; otherwise requires an identity
    /// holding every listed permission.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if permissions are required and no identity is
    ///   attached
    /// - `InsufficientPermissions` if any is missing; which ones is logged
    pub async fn authorize<S: AsRef<str>>(
        &self,
        identity: Option<&Identity>,
        required: &[S],
    ) -> AuthResult<()> {
        if required.is_empty() {
            return Ok(());
        }
        let Some(identity) = identity else {
            return Err(AuthError::unauthenticated("authentication required"));
        };

        let missing = self.resolver.missing(identity.id, required).await?;
        if missing.is_empty() {
            return Ok(());
        }

        tracing::warn!(
            user_id = %identity.id,
            username = %identity.username,
            missing = ?missing,
            "Permission denied"
        );
        Err(AuthError::InsufficientPermissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryRoleStorage, RoleStorage};
    use std::time::Duration;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(
            TokenIssuer::new(
                b"guard-test-secret-guard-test-secret!!",
                "medrec",
                Duration::from_secs(900),
                Duration::from_secs(3600),
            )
            .unwrap(),
        )
    }

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: "pharm".into(),
            email: "pharm@example.org".into(),
            roles: vec!["Pharmacist".into()],
        }
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_token(Some("bearer   abc")), Some("abc"));
        assert_eq!(extract_token(Some("abc.def")), Some("abc.def"));
        assert_eq!(extract_token(Some("Bearer")), None);
        assert_eq!(extract_token(Some("Bearer ")), None);
        assert_eq!(extract_token(Some("   ")), None);
        assert_eq!(extract_token(None), None);
    }

    #[test]
    fn test_authenticate_bearer_and_bare() {
        let issuer = issuer();
        let guard = AuthenticationGuard::new(issuer.clone());
        let who = identity();
        let token = issuer
            .sign_access(&issuer.claims_for(&who, OffsetDateTime::now_utc()))
            .unwrap();

        let with_scheme = guard.authenticate(Some(&format!("Bearer {token}"))).unwrap();
        assert_eq!(with_scheme, who);
        let bare = guard.authenticate(Some(&token)).unwrap();
        assert_eq!(bare, who);
    }

    #[test]
    fn test_expired_and_invalid_look_the_same() {
        let issuer = issuer();
        let guard = AuthenticationGuard::new(issuer.clone());
        let old = issuer
            .sign_access(&issuer.claims_for(&identity(), OffsetDateTime::UNIX_EPOCH))
            .unwrap();

        let expired = guard.authenticate(Some(&old)).unwrap_err();
        let garbage = guard.authenticate(Some("garbage")).unwrap_err();
        let missing = guard.authenticate(None).unwrap_err();
        assert!(matches!(expired, AuthError::Unauthenticated { .. }));
        assert!(matches!(garbage, AuthError::Unauthenticated { .. }));
        assert!(matches!(missing, AuthError::Unauthenticated { .. }));
        assert_eq!(expired.to_string(), garbage.to_string());
    }

    #[tokio::test]
    async fn test_permission_guard() {
        let roles = Arc::new(InMemoryRoleStorage::new());
        let who = identity();
        roles.assign_role(who.id, "Pharmacist").await.unwrap();
        roles
            .grant_permission("Pharmacist", "inventory:read")
            .await
            .unwrap();
        let guard = PermissionGuard::new(PermissionResolver::new(roles));

        let none: [&str; 0] = [];
        assert!(guard.authorize(None, &none).await.is_ok());
        assert!(guard.authorize(Some(&who), &["inventory:read"]).await.is_ok());
        assert!(matches!(
            guard.authorize(None, &["inventory:read"]).await,
            Err(AuthError::Unauthenticated { .. })
        ));
        assert!(matches!(
            guard
                .authorize(Some(&who), &["inventory:read", "inventory:write"])
                .await,
            Err(AuthError::InsufficientPermissions)
        ));
    }
}
