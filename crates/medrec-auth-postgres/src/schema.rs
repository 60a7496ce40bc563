//! Schema bootstrap.
//!
//! Every statement is idempotent so bootstrap can run on each startup.

use sqlx_core::query::query;

use crate::{PgPool, StorageResult};

/// DDL statements, applied in order.
pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS credential (
        id            UUID PRIMARY KEY,
        username      TEXT NOT NULL,
        email         TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        active        BOOLEAN NOT NULL DEFAULT TRUE,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS credential_active_username_idx
        ON credential (username) WHERE active
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS credential_active_email_idx
        ON credential (lower(email)) WHERE active
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_assignment (
        user_id UUID NOT NULL REFERENCES credential (id) ON DELETE CASCADE,
        role    TEXT NOT NULL,
        PRIMARY KEY (user_id, role)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permission (
        role       TEXT NOT NULL,
        permission TEXT NOT NULL,
        PRIMARY KEY (role, permission)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS refresh_token (
        id         UUID PRIMARY KEY,
        user_id    UUID NOT NULL REFERENCES credential (id) ON DELETE CASCADE,
        lookup_id  TEXT NOT NULL,
        token_hash TEXT NOT NULL,
        issued_at  TIMESTAMPTZ NOT NULL,
        revoked_at TIMESTAMPTZ,
        origin     TEXT,
        user_agent TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS refresh_token_active_lookup_idx
        ON refresh_token (lookup_id) WHERE revoked_at IS NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS refresh_token_active_user_idx
        ON refresh_token (user_id) WHERE revoked_at IS NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS refresh_token_issued_at_idx
        ON refresh_token (issued_at)
    "#,
];

/// Applies [`STATEMENTS`].
///
/// # Errors
///
/// Returns the first failing statement's error.
pub async fn bootstrap(pool: &PgPool) -> StorageResult<()> {
    for statement in STATEMENTS {
        query(*statement).execute(pool).await?;
    }
    tracing::info!(statements = STATEMENTS.len(), "Auth schema ready");
    Ok(())
}
