//! Error responses.
//!
//! `AuthError` maps to a JSON body `{ "error", "message" }` plus
//! `remainingAttempts` or `unlockAt` where they apply. Authentication
//! failures all share one generic message; server errors are logged and
//! answered with a generic body.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;

use crate::error::AuthError;

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Auth request failed");
        }

        let mut body = error_body(self.error_code(), &message);
        match &self {
            AuthError::InvalidCredentials {
                remaining_attempts: Some(remaining),
            } => {
                body["remainingAttempts"] = json!(remaining);
            }
            AuthError::AccountLocked { unlock_at } => {
                if let Ok(formatted) = unlock_at.format(&Rfc3339) {
                    body["unlockAt"] = json!(formatted);
                }
            }
            _ => {}
        }

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(self.error_code());
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}

/// HTTP status and client-facing message.
fn error_details(error: &AuthError) -> (StatusCode, String) {
    match error {
        AuthError::InvalidCredentials { .. } => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
        }
        AuthError::AccountLocked { .. } => (
            StatusCode::LOCKED,
            "Account temporarily locked".to_string(),
        ),
        AuthError::TokenExpired
        | AuthError::TokenInvalid { .. }
        | AuthError::TokenNotFound
        | AuthError::Unauthenticated { .. } => (
            StatusCode::UNAUTHORIZED,
            "Authentication required".to_string(),
        ),
        AuthError::InsufficientPermissions => (
            StatusCode::FORBIDDEN,
            "Insufficient permissions".to_string(),
        ),
        AuthError::InvalidRequest { message } => (StatusCode::BAD_REQUEST, message.clone()),
        AuthError::Conflict { message } => (StatusCode::CONFLICT, message.clone()),
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    }
}

/// `Bearer realm="medrec", error="..."` for 401 responses.
fn build_www_authenticate_header(error: &str) -> String {
    format!("Bearer realm=\"medrec\", error=\"{error}\"")
}

// =============================================================================
// Helper Functions
// =============================================================================

/// JSON error body used by every auth endpoint.
#[must_use]
pub fn error_body(error: &str, message: &str) -> Value {
    json!({
        "error": error,
        "message": message,
    })
}

// =============================================================================
// Tests
// =============================================================================
