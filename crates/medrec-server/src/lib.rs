//! HTTP server for the MedRec authentication subsystem.
//!
//! Wires configuration, storage and lockout backends, background
//! maintenance and the `/auth` router into a runnable axum server.

pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod lockout_store;
pub mod maintenance;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::{
    AppConfig, LockoutBackend, PostgresStorageConfig, RedisConfig, ServerConfig, StorageBackend,
};
pub use handlers::Readiness;
pub use lockout_store::RedisLockoutStore;
pub use observability::init_tracing;
pub use server::{MedrecServer, ServerBuilder, build_app, in_memory_storages};
