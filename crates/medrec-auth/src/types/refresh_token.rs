//! Refresh token record.
//!
//! # Security
//!
//! - The secret itself is never stored, only its Argon2 digest
//! - `lookup_id` is the public first 32 hex characters of the secret and
//!   only narrows the candidate set; it authenticates nothing on its own
//! - A record is mutated exactly once, to set `revoked_at`

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Where a session was opened from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadata {
    /// Client address as seen by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Raw `User-Agent` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Persisted refresh token.
///
/// `revoked_at == None` means active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    pub id: Uuid,

    /// Owning identity.
    pub user_id: Uuid,

    /// Public lookup prefix of the secret.
    pub lookup_id: String,

    /// Argon2 digest of the full secret.
    #[serde(skip_serializing, default)]
    pub token_hash: String,

    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,

    #[serde(flatten)]
    pub device: DeviceMetadata,
}

impl RefreshTokenRecord {
    /// Creates a new active record issued at `issued_at`.
    #[must_use]
    pub fn new(
        user_id: Uuid,
        lookup_id: impl Into<String>,
        token_hash: impl Into<String>,
        device: DeviceMetadata,
        issued_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            lookup_id: lookup_id.into(),
            token_hash: token_hash.into(),
            issued_at,
            revoked_at: None,
            device,
        }
    }

    /// Returns `true` if the record has not been revoked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    /// Returns `true` if the record is older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, ttl: Duration, now: OffsetDateTime) -> bool {
        now >= self.issued_at + ttl
    }

    /// Returns `true` if the record can still be exchanged at `now`.
    #[must_use]
    pub fn is_usable_at(&self, ttl: Duration, now: OffsetDateTime) -> bool {
        self.is_active() && !self.is_expired_at(ttl, now)
    }
}

/// Client-facing view of an active session. Never carries the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,

    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Short device label derived from the user agent, e.g. "Firefox on Linux".
    pub device_name: String,
}

impl SessionSummary {
    /// Builds the view of `record` given the refresh token lifetime.
    #[must_use]
    pub fn from_record(record: &RefreshTokenRecord, ttl: Duration) -> Self {
        Self {
            id: record.id,
            issued_at: record.issued_at,
            expires_at: record.issued_at + ttl,
            origin: record.device.origin.clone(),
            user_agent: record.device.user_agent.clone(),
            device_name: crate::device::device_name(record.device.user_agent.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record() -> RefreshTokenRecord {
        RefreshTokenRecord::new(
            Uuid::new_v4(),
            "0123456789abcdef0123456789abcdef",
            "$argon2id$digest",
            DeviceMetadata {
                origin: Some("10.0.0.7".into()),
                user_agent: None,
            },
            datetime!(2026-03-01 08:00 UTC),
        )
    }

    #[test]
    fn test_new_record_is_active() {
        assert!(record().is_active());
    }

    #[test]
    fn test_expiry_boundary() {
        let r = record();
        let ttl = Duration::days(7);
        assert!(!r.is_expired_at(ttl, datetime!(2026-03-08 07:59:59 UTC)));
        assert!(r.is_expired_at(ttl, datetime!(2026-03-08 08:00 UTC)));
    }

    #[test]
    fn test_revoked_record_not_usable() {
        let mut r = record();
        r.revoked_at = Some(datetime!(2026-03-01 09:00 UTC));
        assert!(!r.is_usable_at(Duration::days(7), datetime!(2026-03-01 10:00 UTC)));
    }

    #[test]
    fn test_digest_never_serialized() {
        let json = serde_json::to_value(record()).unwrap();
        assert!(json.get("tokenHash").is_none());
        assert_eq!(json["origin"], "10.0.0.7");
        assert!(json.get("userAgent").is_none());
    }

    #[test]
    fn test_session_summary_expiry() {
        let r = record();
        let summary = SessionSummary::from_record(&r, Duration::days(7));
        assert_eq!(summary.expires_at, datetime!(2026-03-08 08:00 UTC));
        assert_eq!(summary.device_name, "Unknown device");
    }
}
