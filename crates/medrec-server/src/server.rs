use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::get,
};
use medrec_auth::storage::{
    InMemoryCredentialStorage, InMemoryRefreshTokenStorage, InMemoryRoleStorage,
};
use medrec_auth::{AuthService, AuthState, AuthStorages, InMemoryLockoutStore, LockoutStore};
use medrec_auth_postgres::PostgresAuthStorage;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    bootstrap,
    config::{AppConfig, LockoutBackend, StorageBackend},
    handlers::{self, Readiness},
    lockout_store::{RedisLockoutStore, create_redis_pool},
    maintenance::MaintenanceTasks,
    middleware as app_middleware,
};

pub struct MedrecServer {
    addr: SocketAddr,
    app: Router,
    service: AuthService,
    config: AppConfig,
}

pub fn build_app(cfg: &AppConfig, auth: AuthState, readiness: Readiness) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let timeout = cfg.request_timeout();

    let health = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .with_state(readiness);

    let auth_routes =
        medrec_auth::auth_router(auth).layer(middleware::from_fn(app_middleware::no_store));

    // Middleware stack (outermost first): request id -> trace -> timeout -> body limit
    health
        .merge(auth_routes)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<app_middleware::RequestId>()
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

/// In-process credential, role and refresh token storage.
pub fn in_memory_storages() -> AuthStorages {
    AuthStorages {
        credentials: Arc::new(InMemoryCredentialStorage::new()),
        roles: Arc::new(InMemoryRoleStorage::new()),
        refresh_tokens: Arc::new(InMemoryRefreshTokenStorage::new()),
    }
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects the storage and lockout backends, prepares the schema,
    /// builds the auth service and bootstraps the admin credential.
    pub async fn build(self) -> anyhow::Result<MedrecServer> {
        let cfg = self.config;
        let mut readiness = Readiness::default();

        let storages = match cfg.storage.backend {
            StorageBackend::Postgres => {
                let pg_cfg = cfg
                    .storage
                    .postgres
                    .clone()
                    .context("storage.postgres is not configured")?;
                let pg = PostgresAuthStorage::connect_with(
                    &pg_cfg.connection_url(),
                    pg_cfg.pool_size,
                    pg_cfg.connect_timeout(),
                )
                .await
                .context("failed to connect to PostgreSQL")?;
                pg.bootstrap_schema()
                    .await
                    .context("failed to prepare auth schema")?;
                let storages = pg.auth_storages();
                readiness.postgres = Some(pg);
                storages
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; credentials and sessions are lost on restart");
                in_memory_storages()
            }
        };

        let lockout_store: Arc<dyn LockoutStore> = match cfg.lockout_store.backend {
            LockoutBackend::Memory => Arc::new(InMemoryLockoutStore::new()),
            LockoutBackend::Redis => {
                let pool = create_redis_pool(&cfg.redis)
                    .await
                    .map_err(anyhow::Error::msg)?;
                readiness.redis = Some(pool.clone());
                Arc::new(RedisLockoutStore::new(
                    pool,
                    cfg.redis.key_prefix.clone(),
                    &cfg.auth.lockout,
                ))
            }
        };

        let roles = storages.roles.clone();
        let service = AuthService::new(&cfg.auth, storages, lockout_store)
            .context("failed to initialize authentication")?;

        if let Some(ref admin) = cfg.bootstrap.admin_user {
            bootstrap::bootstrap_admin_user(&service, &roles, admin)
                .await
                .context("admin bootstrap failed")?;
        }

        let app = build_app(&cfg, AuthState::new(service.clone()), readiness);

        Ok(MedrecServer {
            addr: self.addr,
            app,
            service,
            config: cfg,
        })
    }
}

impl MedrecServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The fully layered router, without connect info.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub fn service(&self) -> &AuthService {
        &self.service
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let maintenance = MaintenanceTasks::start(self.service.clone(), &self.config.maintenance);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let result = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        maintenance.shutdown();
        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
