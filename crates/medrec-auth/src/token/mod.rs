//! Access token signing and refresh secret generation.
//!
//! - [`jwt`] - HS256 access tokens ([`TokenIssuer`])
//! - [`secret`] - opaque refresh secret format

pub mod jwt;
pub mod secret;

pub use jwt::{AccessTokenClaims, JwtError, TokenIssuer};
pub use secret::{
    LOOKUP_ID_LEN, REFRESH_SECRET_BYTES, REFRESH_SECRET_HEX_LEN, generate_refresh_secret,
    is_well_formed_refresh_secret, lookup_id,
};
