//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use medrec_auth::config::{AuthConfig, PasswordConfig, SigningConfig};
use medrec_auth::storage::{
    InMemoryCredentialStorage, InMemoryRefreshTokenStorage, InMemoryRoleStorage, RoleStorage,
};
use medrec_auth::{AuthService, AuthStorages, DeviceMetadata, Identity, InMemoryLockoutStore};

pub const SIGNING_SECRET: &str = "integration-signing-secret-0123456789abcdef";
pub const DOCTOR_PASSWORD: &str = "Cardio-Rhythm-Seven-7";
pub const ADMIN_PASSWORD: &str = "Ward-Console-Key-42";

pub struct Harness {
    pub service: AuthService,
    pub roles: Arc<InMemoryRoleStorage>,
    pub refresh_tokens: Arc<InMemoryRefreshTokenStorage>,
}

pub fn config(failure_delay: Duration) -> AuthConfig {
    AuthConfig {
        signing: SigningConfig {
            secret: SIGNING_SECRET.to_string(),
        },
        password: PasswordConfig::minimal(),
        failure_delay,
        ..Default::default()
    }
}

pub fn harness_with(config: &AuthConfig) -> Harness {
    let roles = Arc::new(InMemoryRoleStorage::new());
    let refresh_tokens = Arc::new(InMemoryRefreshTokenStorage::new());
    let storages = AuthStorages {
        credentials: Arc::new(InMemoryCredentialStorage::new()),
        roles: roles.clone(),
        refresh_tokens: refresh_tokens.clone(),
    };
    let service = AuthService::new(config, storages, Arc::new(InMemoryLockoutStore::new()))
        .expect("valid test configuration");
    Harness {
        service,
        roles,
        refresh_tokens,
    }
}

pub fn harness() -> Harness {
    harness_with(&config(Duration::ZERO))
}

pub fn device(origin: &str) -> DeviceMetadata {
    DeviceMetadata {
        origin: Some(origin.to_string()),
        user_agent: Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0".to_string()),
    }
}

impl Harness {
    /// Registers `dr.house` with the Doctor role and its grants.
    pub async fn doctor(&self) -> Identity {
        for permission in ["patients:read", "patients:write", "prescriptions:write"] {
            self.roles
                .grant_permission("Doctor", permission)
                .await
                .expect("grant");
        }
        self.service
            .register_credential(
                "dr.house",
                "house@princeton-plainsboro.org",
                DOCTOR_PASSWORD,
                &["Doctor".to_string()],
            )
            .await
            .expect("register doctor")
    }

    /// Registers `admin` with the Admin role holding `sessions:revoke`.
    pub async fn admin(&self) -> Identity {
        self.roles
            .grant_permission("Admin", "sessions:revoke")
            .await
            .expect("grant");
        self.service
            .register_credential(
                "admin",
                "admin@medrec.local",
                ADMIN_PASSWORD,
                &["Admin".to_string()],
            )
            .await
            .expect("register admin")
    }
}
