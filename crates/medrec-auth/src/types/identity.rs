//! Authenticated identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::token::AccessTokenClaims;

/// Public identity summary.
///
/// Returned in login responses and by `/auth/me`, and attached to every
/// guarded request for downstream authorization and audit attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl TryFrom<AccessTokenClaims> for Identity {
    type Error = uuid::Error;

    fn try_from(claims: AccessTokenClaims) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&claims.sub)?,
            username: claims.username,
            email: claims.email,
            roles: claims.roles,
        })
    }
}
