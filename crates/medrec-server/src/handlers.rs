use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use deadpool_redis::Pool as RedisPool;
use medrec_auth_postgres::PostgresAuthStorage;
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failing: Vec<&'a str>,
}

/// Backends checked by `/readyz`. Absent backends are not checked.
#[derive(Clone, Default)]
pub struct Readiness {
    pub postgres: Option<PostgresAuthStorage>,
    pub redis: Option<RedisPool>,
}

impl Readiness {
    /// Names of backends that did not answer.
    pub async fn failing(&self) -> Vec<&'static str> {
        let mut failing = Vec::new();
        if let Some(ref pg) = self.postgres {
            if let Err(e) = pg.ping().await {
                tracing::warn!(error = %e, "PostgreSQL readiness check failed");
                failing.push("postgres");
            }
        }
        if let Some(ref pool) = self.redis {
            if let Err(e) = pool.get().await {
                tracing::warn!(error = %e, "Redis readiness check failed");
                failing.push("redis");
            }
        }
        failing
    }
}

pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            failing: Vec::new(),
        }),
    )
}

pub async fn readyz(State(readiness): State<Readiness>) -> impl IntoResponse {
    let failing = readiness.failing().await;
    if failing.is_empty() {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                failing,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable",
                failing,
            }),
        )
    }
}
