//! Logout endpoint.

use axum::{body::Bytes, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::error::AuthError;
use crate::middleware::{AuthState, BearerAuth};

use super::parse_body;

/// Optional body of `POST /auth/logout`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub all_devices: bool,
    /// Refresh token of the session to end. Without it every session of
    /// the caller is revoked.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Handler for `POST /auth/logout`.
///
/// Always responds 204 for an authenticated caller, even when nothing was
/// left to revoke.
///
/// # Errors
///
/// - 401 without a valid access token
/// - 400 if a body is present but malformed
pub async fn logout_handler(
    State(state): State<AuthState>,
    BearerAuth(identity): BearerAuth,
    body: Bytes,
) -> Result<StatusCode, AuthError> {
    let request: LogoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LogoutRequest::default()
    } else {
        parse_body(&body)?
    };

    state
        .service
        .logout(
            identity.id,
            request.all_devices,
            request.refresh_token.as_deref().map(str::trim),
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
