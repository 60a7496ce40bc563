//! Endpoints about the calling identity.

use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::error::AuthError;
use crate::middleware::{AuthState, BearerAuth};
use crate::types::Identity;

use super::parse_body;

/// Body of `POST /auth/password`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Handler for `GET /auth/me`.
///
/// Roles are read from current assignments, not from the token.
pub async fn me_handler(
    State(state): State<AuthState>,
    BearerAuth(identity): BearerAuth,
) -> Result<Json<Identity>, AuthError> {
    Ok(Json(state.service.me(identity.id).await?))
}

/// Handler for `POST /auth/password`.
///
/// Every refresh token of the caller is revoked on success; access tokens
/// already issued stay valid until they expire.
///
/// # Errors
///
/// - 401 if the current password is wrong
/// - 400 if the new password fails strength validation
pub async fn change_password_handler(
    State(state): State<AuthState>,
    BearerAuth(identity): BearerAuth,
    body: Bytes,
) -> Result<StatusCode, AuthError> {
    let request: ChangePasswordRequest = parse_body(&body)?;
    state
        .service
        .change_password(identity.id, &request.current_password, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
