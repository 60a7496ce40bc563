//! Domain types shared across the auth crate.
//!
//! - [`Credential`] - username/email/password-hash record
//! - [`Identity`] - public identity summary, also the request-scoped context
//! - [`RefreshTokenRecord`] - persisted refresh-secret hash with device metadata

pub mod credential;
pub mod identity;
pub mod refresh_token;

pub use credential::Credential;
pub use identity::Identity;
pub use refresh_token::{DeviceMetadata, RefreshTokenRecord, SessionSummary};
