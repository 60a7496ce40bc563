//! Credential domain type.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A username/password credential.
///
/// At most one active credential may own a given username or email.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Identity this credential authenticates.
    pub id: Uuid,

    /// Login name, unique among active credentials.
    pub username: String,

    /// Email, unique among active credentials. Also accepted at login.
    pub email: String,

    /// Argon2 PHC digest. Never serialized outward.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Inactive credentials cannot log in and do not hold their
    /// username/email.
    pub active: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Credential {
    /// Creates a new active credential with a fresh id.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` if `login` names this credential by username or email.
    ///
    /// Usernames compare exactly; emails compare case-insensitively.
    #[must_use]
    pub fn matches_login(&self, login: &str) -> bool {
        self.username == login || self.email.eq_ignore_ascii_case(login)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
