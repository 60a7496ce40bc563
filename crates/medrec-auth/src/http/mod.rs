//! HTTP handlers for the `/auth` endpoints.
//!
//! # Routes
//!
//! | Method | Path | Guard |
//! |--------|------|-------|
//! | POST | `/auth/login` | none |
//! | POST | `/auth/refresh` | none |
//! | POST | `/auth/logout` | bearer |
//! | GET | `/auth/me` | bearer |
//! | GET | `/auth/sessions` | bearer |
//! | POST | `/auth/password` | bearer |
//! | POST | `/auth/users/{id}/sessions/revoke` | bearer + `sessions:revoke` |

pub mod account;
pub mod logout;
pub mod sessions;
pub mod token;

pub use account::{ChangePasswordRequest, change_password_handler, me_handler};
pub use logout::{LogoutRequest, logout_handler};
pub use sessions::{RevokeSessionsResponse, list_sessions_handler, revoke_user_sessions_handler};
pub use token::{LoginRequest, RefreshRequest, login_handler, refresh_handler};

use axum::{
    Extension, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde::de::DeserializeOwned;

use crate::AuthResult;
use crate::error::AuthError;
use crate::middleware::{AuthState, RequiredPermissions, authenticate, permission_guard};

/// Permission required to revoke another identity's sessions.
pub const SESSIONS_REVOKE: &str = "sessions:revoke";

/// Builds the `/auth` router.
///
/// Login and refresh are open. Everything else runs behind
/// [`authenticate`]; the administrative route additionally runs behind
/// [`permission_guard`].
pub fn auth_router(state: AuthState) -> Router {
    let public = Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler));

    let admin = Router::new()
        .route(
            "/auth/users/{id}/sessions/revoke",
            post(revoke_user_sessions_handler),
        )
        .route_layer(from_fn_with_state(state.clone(), permission_guard))
        .route_layer(Extension(RequiredPermissions::new(&[SESSIONS_REVOKE])));

    let protected = Router::new()
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        .route("/auth/sessions", get(list_sessions_handler))
        .route("/auth/password", post(change_password_handler))
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    public.merge(protected).with_state(state)
}

/// Parses a JSON request body, mapping any failure to a 400.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> AuthResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AuthError::invalid_request(format!("invalid request body: {e}")))
}
