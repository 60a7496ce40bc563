//! Session listing and administrative revocation.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AuthError;
use crate::middleware::{AuthState, BearerAuth};
use crate::types::SessionSummary;

/// Response of the revocation endpoint.
#[derive(Debug, Serialize)]
pub struct RevokeSessionsResponse {
    pub revoked: u64,
}

/// Handler for `GET /auth/sessions`.
pub async fn list_sessions_handler(
    State(state): State<AuthState>,
    BearerAuth(identity): BearerAuth,
) -> Result<Json<Vec<SessionSummary>>, AuthError> {
    Ok(Json(state.service.list_sessions(identity.id).await?))
}

/// Handler for `POST /auth/users/{id}/sessions/revoke`.
///
/// Mounted behind the permission guard with `sessions:revoke` required.
///
/// # Errors
///
/// - 400 if the path id is not a UUID
pub async fn revoke_user_sessions_handler(
    State(state): State<AuthState>,
    BearerAuth(actor): BearerAuth,
    Path(user_id): Path<String>,
) -> Result<Json<RevokeSessionsResponse>, AuthError> {
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| AuthError::invalid_request("user id must be a UUID"))?;
    let revoked = state.service.revoke_sessions(actor.id, user_id).await?;
    Ok(Json(RevokeSessionsResponse { revoked }))
}
