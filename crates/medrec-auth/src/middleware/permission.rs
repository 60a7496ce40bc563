//! Permission enforcement middleware.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AuthError;
use crate::types::Identity;

use super::auth::AuthState;

/// Permissions an operation requires, attached to its route as an
/// `Extension`. Routes without one are open to [`permission_guard`].
#[derive(Debug, Clone, Copy)]
pub struct RequiredPermissions(pub &'static [&'static str]);

impl RequiredPermissions {
    #[must_use]
    pub const fn new(permissions: &'static [&'static str]) -> Self {
        Self(permissions)
    }
}

/// Enforces the route's [`RequiredPermissions`] against the identity
/// attached by [`authenticate`](super::authenticate).
///
/// # Errors
///
/// - 401 if permissions are declared and no identity is attached
/// - 403 if any declared permission is missing
pub async fn permission_guard(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let required = request
        .extensions()
        .get::<RequiredPermissions>()
        .copied()
        .unwrap_or(RequiredPermissions(&[]));

    state
        .permissions
        .authorize(request.extensions().get::<Identity>(), required.0)
        .await?;

    Ok(next.run(request).await)
}
