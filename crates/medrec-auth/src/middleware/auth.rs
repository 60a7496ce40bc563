//! Bearer token authentication.
//!
//! # Example
//!
//! ```ignore
//! use medrec_auth::middleware::BearerAuth;
//!
//! async fn protected_handler(BearerAuth(identity): BearerAuth) -> String {
//!     format!("Hello, {}!", identity.username)
//! }
//! ```

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::device::device_metadata;
use crate::error::AuthError;
use crate::guard::{AuthenticationGuard, PermissionGuard};
use crate::service::AuthService;
use crate::types::{DeviceMetadata, Identity};

// =============================================================================
// Auth State
// =============================================================================

/// State shared by the auth handlers, extractors and middleware.
///
/// Include it in your application state and expose it via `FromRef`.
///
/// ```ignore
/// #[derive(Clone)]
/// struct AppState {
///     auth: AuthState,
/// }
///
/// impl FromRef<AppState> for AuthState {
///     fn from_ref(state: &AppState) -> Self {
///         state.auth.clone()
///     }
/// }
/// ```
#[derive(Clone)]
pub struct AuthState {
    pub service: AuthService,
    pub authentication: AuthenticationGuard,
    pub permissions: PermissionGuard,
    /// Peers allowed to forward the client address.
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AuthState {
    #[must_use]
    pub fn new(service: AuthService) -> Self {
        Self {
            authentication: AuthenticationGuard::new(service.issuer()),
            permissions: PermissionGuard::new(service.permissions().clone()),
            trusted_proxies: service.trusted_proxies(),
            service,
        }
    }
}

// =============================================================================
// Bearer Auth Extractor
// =============================================================================

/// Extractor for the authenticated identity.
///
/// Uses the identity attached by [`authenticate`] when present, otherwise
/// verifies the `Authorization` header itself.
///
/// # Errors
///
/// Rejects with `AuthError::Unauthenticated` (401).
pub struct BearerAuth(pub Identity);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(Self(identity.clone()));
        }

        let auth_state = AuthState::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        let identity = auth_state.authentication.authenticate(header)?;

        parts.extensions.insert(identity.clone());
        Ok(Self(identity))
    }
}

// =============================================================================
// Client Device Extractor
// =============================================================================

/// Origin address and user agent of the caller.
///
/// The peer address is read from `ConnectInfo` when the server was started
/// with `into_make_service_with_connect_info`; without it the origin is
/// `"unknown"`. Forwarding headers count only when the peer is listed in
/// [`AuthState::trusted_proxies`].
pub struct ClientDevice(pub DeviceMetadata);

impl<S> FromRequestParts<S> for ClientDevice
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(device_metadata(
            &parts.headers,
            peer,
            &auth_state.trusted_proxies,
        )))
    }
}

// =============================================================================
// Authentication Middleware
// =============================================================================

/// Verifies the bearer token and attaches the [`Identity`] to the request
/// extensions for downstream handlers and middleware.
///
/// Requests without an `Authorization` header pass through unauthenticated;
/// [`permission_guard`](super::permission_guard) rejects them wherever
/// permissions are declared.
///
/// # Errors
///
/// Responds 401 if a header is present but does not verify.
pub async fn authenticate(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|h| h.to_str().unwrap_or_default());

    if header.is_some() {
        let identity = state.authentication.authenticate(header)?;
        tracing::debug!(user_id = %identity.id, "Request authenticated");
        request.extensions_mut().insert(identity);
    }

    Ok(next.run(request).await)
}
