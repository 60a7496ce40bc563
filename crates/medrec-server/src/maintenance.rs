//! Background maintenance: refresh token purge and lockout sweep.

use std::time::Duration;

use medrec_auth::AuthService;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::MaintenanceConfig;

/// Handles of the running maintenance tasks. Dropping it does not stop
/// them; call [`MaintenanceTasks::shutdown`].
pub struct MaintenanceTasks {
    handles: Vec<JoinHandle<()>>,
}

impl MaintenanceTasks {
    /// Spawns the purge and sweep loops.
    pub fn start(service: AuthService, config: &MaintenanceConfig) -> Self {
        let handles = vec![
            start_purge_task(service.clone(), config.purge_interval),
            start_sweep_task(service, config.sweep_interval),
        ];
        tracing::info!(
            purge_interval = ?config.purge_interval,
            sweep_interval = ?config.sweep_interval,
            "Maintenance tasks started"
        );
        Self { handles }
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        tracing::debug!("Maintenance tasks stopped");
    }
}

/// Deletes refresh token records older than the refresh lifetime.
fn start_purge_task(service: AuthService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match service.purge_expired_tokens().await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, "Purged expired refresh tokens");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Refresh token purge failed");
                }
                _ => {}
            }
        }
    })
}

/// Drops lockout buckets with no recent attempts.
fn start_sweep_task(service: AuthService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match service.sweep_lockouts().await {
                Ok(dropped) if dropped > 0 => {
                    tracing::debug!(dropped, "Swept idle lockout buckets");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Lockout sweep failed");
                }
                _ => {}
            }
        }
    })
}
