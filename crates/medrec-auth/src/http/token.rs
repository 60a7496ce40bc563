//! Login and refresh endpoints.
//!
//! Both endpoints are unguarded and return a [`TokenPair`] on success.

use axum::{Json, body::Bytes, extract::State};
use serde::Deserialize;

use crate::error::AuthError;
use crate::middleware::{AuthState, ClientDevice};
use crate::service::TokenPair;

use super::parse_body;

// =============================================================================
// Request Types
// =============================================================================

/// Body of `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email address.
    pub username: String,
    pub password: String,
}

/// Body of `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Handler for `POST /auth/login`.
///
/// # Errors
///
/// - 400 if the body is malformed or a field is empty
/// - 401 with `remainingAttempts` on bad credentials
/// - 423 with `unlockAt` while locked out
pub async fn login_handler(
    State(state): State<AuthState>,
    ClientDevice(device): ClientDevice,
    body: Bytes,
) -> Result<Json<TokenPair>, AuthError> {
    let request: LoginRequest = parse_body(&body)?;
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Err(AuthError::invalid_request(
            "username and password are required",
        ));
    }

    let pair = state
        .service
        .login(username, &request.password, device)
        .await?;
    Ok(Json(pair))
}

/// Handler for `POST /auth/refresh`.
///
/// The presented refresh token is consumed whether or not the new pair
/// reaches the client.
///
/// # Errors
///
/// - 400 if the body is malformed
/// - 401 if the token is malformed, unknown, expired, revoked or already
///   rotated
pub async fn refresh_handler(
    State(state): State<AuthState>,
    ClientDevice(device): ClientDevice,
    body: Bytes,
) -> Result<Json<TokenPair>, AuthError> {
    let request: RefreshRequest = parse_body(&body)?;
    let pair = state
        .service
        .refresh(request.refresh_token.trim(), device)
        .await?;
    Ok(Json(pair))
}
