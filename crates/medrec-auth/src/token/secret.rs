//! Opaque refresh secret format.
//!
//! A refresh secret is 64 random bytes, hex-encoded (128 characters). The
//! first 32 characters double as a public lookup id, so the store can find
//! the one candidate record without scanning every active session. The
//! remaining 96 characters (48 random bytes) stay private.

use rand::{RngCore, rngs::OsRng};

/// Random bytes in a refresh secret.
pub const REFRESH_SECRET_BYTES: usize = 64;

/// Length of the hex-encoded secret.
pub const REFRESH_SECRET_HEX_LEN: usize = REFRESH_SECRET_BYTES * 2;

/// Length of the public lookup prefix.
pub const LOOKUP_ID_LEN: usize = 32;

/// Generates a new lower-case hex refresh secret.
#[must_use]
pub fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Returns `true` for exactly 128 hex characters, in either case.
#[must_use]
pub fn is_well_formed_refresh_secret(secret: &str) -> bool {
    secret.len() == REFRESH_SECRET_HEX_LEN && secret.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Public lookup prefix of a well-formed secret.
#[must_use]
pub fn lookup_id(secret: &str) -> Option<&str> {
    if is_well_formed_refresh_secret(secret) {
        Some(&secret[..LOOKUP_ID_LEN])
    } else {
        None
    }
}
