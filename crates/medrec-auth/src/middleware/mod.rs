//! HTTP middleware for authentication and authorization.
//!
//! - [`BearerAuth`] - extractor yielding the authenticated [`Identity`](crate::types::Identity)
//! - [`ClientDevice`] - extractor yielding origin and user agent
//! - [`authenticate`] - middleware attaching the identity to request extensions
//! - [`permission_guard`] - middleware enforcing [`RequiredPermissions`]
//! - `IntoResponse` for [`AuthError`](crate::error::AuthError)
//!
//! # Example
//!
//! ```ignore
//! use axum::{Extension, Router, middleware::from_fn_with_state, routing::get};
//! use medrec_auth::middleware::{RequiredPermissions, authenticate, permission_guard};
//!
//! let patients = Router::new()
//!     .route(
//!         "/patients",
//!         get(list_patients)
//!             .route_layer(from_fn_with_state(auth_state.clone(), permission_guard))
//!             .route_layer(Extension(RequiredPermissions::new(&["patients:read"]))),
//!     )
//!     .layer(from_fn_with_state(auth_state.clone(), authenticate))
//!     .with_state(auth_state);
//! ```

pub mod auth;
pub mod error;
pub mod permission;

pub use auth::{AuthState, BearerAuth, ClientDevice, authenticate};
pub use error::error_body;
pub use permission::{RequiredPermissions, permission_guard};
