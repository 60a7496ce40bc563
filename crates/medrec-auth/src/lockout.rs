//! Sliding-window brute-force lockout.
//!
//! Attempts are bucketed per (identifier, origin). A bucket locks once it
//! holds `max_attempts` failures inside the trailing window (counting only
//! failures after the most recent success) and unlocks on its own at
//! `oldest counted failure + lockout_duration`.
//!
//! Keying by origin means an attacker rotating source addresses is not
//! blocked globally; in exchange one abusive network cannot lock a
//! legitimate user out from everywhere.
//!
//! Login reserves its failure before the password is checked
//! ([`LockoutTracker::reserve_failure`]). The lock check and the append
//! happen in one step per key, so a concurrent burst gets at most
//! `max_attempts` password checks per lockout period.
//!
//! The bucket store is a trait: [`InMemoryLockoutStore`] serves a single
//! process, and a shared TTL-capable store (Redis, in `medrec-server`)
//! serves multi-instance deployments.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::config::{LockoutConfig, MAX_LOCKOUT_SPAN};

/// Attempts kept per bucket beyond which the oldest are dropped.
const MAX_BUCKET_LEN: usize = 256;

// ============================================================================
// Store
// ============================================================================

/// Bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockoutKey {
    /// Login identifier as supplied, lower-cased.
    pub identifier: String,
    pub origin: String,
}

impl LockoutKey {
    #[must_use]
    pub fn new(identifier: &str, origin: &str) -> Self {
        Self {
            identifier: identifier.to_lowercase(),
            origin: origin.to_string(),
        }
    }
}

/// One login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub success: bool,
}

/// Storage for lockout buckets.
///
/// Implementations must serialize mutations of the same key.
#[async_trait]
pub trait LockoutStore: Send + Sync {
    /// Appends an attempt and drops entries older than `attempt.at - window`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn record(&self, key: &LockoutKey, attempt: Attempt, window: Duration) -> AuthResult<()>;

    /// Checks the bucket against `policy` as of `at` and, unless it is
    /// locked, appends a failed attempt at `at`. Both steps must be atomic
    /// per key. A lock that has run out is cleared first.
    ///
    /// Returns the status after the reservation: locked (nothing appended)
    /// or open with the attempts left once this failure counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn reserve_failure(
        &self,
        key: &LockoutKey,
        at: OffsetDateTime,
        policy: &LockoutPolicy,
    ) -> AuthResult<LockStatus>;

    /// Attempts at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn attempts_since(
        &self,
        key: &LockoutKey,
        since: OffsetDateTime,
    ) -> AuthResult<Vec<Attempt>>;

    /// Removes the bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn clear(&self, key: &LockoutKey) -> AuthResult<()>;

    /// Drops buckets whose newest attempt is older than `cutoff`. Returns
    /// how many were dropped. Stores with native expiry may return 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn sweep(&self, cutoff: OffsetDateTime) -> AuthResult<u64>;
}

/// Per-process [`LockoutStore`] on a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryLockoutStore {
    buckets: DashMap<LockoutKey, VecDeque<Attempt>>,
}

impl InMemoryLockoutStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[async_trait]
impl LockoutStore for InMemoryLockoutStore {
    async fn record(&self, key: &LockoutKey, attempt: Attempt, window: Duration) -> AuthResult<()> {
        let mut bucket = self.buckets.entry(key.clone()).or_default();
        prune(&mut bucket, attempt.at - window);
        push_bounded(&mut bucket, attempt);
        Ok(())
    }

    async fn reserve_failure(
        &self,
        key: &LockoutKey,
        at: OffsetDateTime,
        policy: &LockoutPolicy,
    ) -> AuthResult<LockStatus> {
        // The entry guard holds the shard lock until the append is done.
        let mut bucket = self.buckets.entry(key.clone()).or_default();
        prune(&mut bucket, at - policy.window);

        let state = policy.evaluate(bucket.make_contiguous(), at);
        let prior = match state {
            BucketState::Locked { unlock_at } => return Ok(LockStatus::locked(unlock_at)),
            BucketState::LockExpired => {
                bucket.clear();
                0
            }
            BucketState::Open { failures } => failures,
        };
        push_bounded(&mut bucket, Attempt { at, success: false });
        Ok(LockStatus::open(
            policy.max_attempts.saturating_sub(prior.saturating_add(1)),
        ))
    }

    async fn attempts_since(
        &self,
        key: &LockoutKey,
        since: OffsetDateTime,
    ) -> AuthResult<Vec<Attempt>> {
        Ok(self
            .buckets
            .get(key)
            .map(|bucket| bucket.iter().filter(|a| a.at >= since).copied().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, key: &LockoutKey) -> AuthResult<()> {
        self.buckets.remove(key);
        Ok(())
    }

    async fn sweep(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.back().is_some_and(|a| a.at >= cutoff));
        Ok(before.saturating_sub(self.buckets.len()) as u64)
    }
}

fn prune(bucket: &mut VecDeque<Attempt>, floor: OffsetDateTime) {
    while bucket.front().is_some_and(|a| a.at < floor) {
        bucket.pop_front();
    }
}

fn push_bounded(bucket: &mut VecDeque<Attempt>, attempt: Attempt) {
    bucket.push_back(attempt);
    while bucket.len() > MAX_BUCKET_LEN {
        bucket.pop_front();
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Lock state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStatus {
    pub locked: bool,
    /// Set when locked.
    pub unlock_at: Option<OffsetDateTime>,
    /// Set when not locked.
    pub remaining_attempts: Option<u32>,
}

impl LockStatus {
    #[must_use]
    pub fn locked(unlock_at: OffsetDateTime) -> Self {
        Self {
            locked: true,
            unlock_at: Some(unlock_at),
            remaining_attempts: None,
        }
    }

    #[must_use]
    pub fn open(remaining_attempts: u32) -> Self {
        Self {
            locked: false,
            unlock_at: None,
            remaining_attempts: Some(remaining_attempts),
        }
    }
}

/// Outcome of [`LockoutPolicy::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    /// Counted failures are below the limit.
    Open { failures: u32 },
    Locked { unlock_at: OffsetDateTime },
    /// The limit was reached but the lock has run out; the bucket should be
    /// cleared.
    LockExpired,
}

/// Lockout parameters as `time` durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub lockout_duration: Duration,
}

impl LockoutPolicy {
    /// Spans above [`MAX_LOCKOUT_SPAN`] are clamped to it.
    #[must_use]
    pub fn from_config(config: &LockoutConfig) -> Self {
        let span = |d: std::time::Duration| {
            Duration::try_from(d.min(MAX_LOCKOUT_SPAN)).unwrap_or(Duration::ZERO)
        };
        Self {
            max_attempts: config.max_attempts,
            window: span(config.window),
            lockout_duration: span(config.lockout_duration),
        }
    }

    /// Evaluates a bucket (oldest first) as of `now`.
    ///
    /// Only failures inside the window, after the most recent success and
    /// not later than `now` count.
    #[must_use]
    pub fn evaluate(&self, attempts: &[Attempt], now: OffsetDateTime) -> BucketState {
        let floor = now - self.window;
        let in_window: Vec<&Attempt> = attempts.iter().filter(|a| a.at >= floor).collect();
        let counted = match in_window.iter().rposition(|a| a.success) {
            Some(i) => &in_window[i + 1..],
            None => &in_window[..],
        };
        let failures: Vec<OffsetDateTime> = counted
            .iter()
            .filter(|a| !a.success && a.at <= now)
            .map(|a| a.at)
            .collect();
        let failure_count = u32::try_from(failures.len()).unwrap_or(u32::MAX);

        match failures.first() {
            Some(oldest) if failure_count >= self.max_attempts => {
                let unlock_at = *oldest + self.lockout_duration;
                if now < unlock_at {
                    BucketState::Locked { unlock_at }
                } else {
                    BucketState::LockExpired
                }
            }
            _ => BucketState::Open {
                failures: failure_count,
            },
        }
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Applies the lockout policy on top of a [`LockoutStore`].
#[derive(Clone)]
pub struct LockoutTracker {
    store: Arc<dyn LockoutStore>,
    policy: LockoutPolicy,
}

impl LockoutTracker {
    #[must_use]
    pub fn new(store: Arc<dyn LockoutStore>, config: &LockoutConfig) -> Self {
        Self {
            store,
            policy: LockoutPolicy::from_config(config),
        }
    }

    /// Failures that lock a bucket.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Records an attempt now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_attempt(
        &self,
        identifier: &str,
        origin: &str,
        success: bool,
    ) -> AuthResult<()> {
        self.record_attempt_at(identifier, origin, success, OffsetDateTime::now_utc())
            .await
    }

    /// Records an attempt at `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_attempt_at(
        &self,
        identifier: &str,
        origin: &str,
        success: bool,
        at: OffsetDateTime,
    ) -> AuthResult<()> {
        let key = LockoutKey::new(identifier, origin);
        self.store
            .record(&key, Attempt { at, success }, self.policy.window)
            .await
    }

    /// Reserves a failed attempt now, unless the bucket is locked.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn reserve_failure(&self, identifier: &str, origin: &str) -> AuthResult<LockStatus> {
        self.reserve_failure_at(identifier, origin, OffsetDateTime::now_utc())
            .await
    }

    /// Reserves a failed attempt at `at`, unless the bucket is locked.
    ///
    /// A caller whose credential check then succeeds clears the bucket with
    /// [`clear_attempts`](Self::clear_attempts); otherwise the reserved
    /// failure stands.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn reserve_failure_at(
        &self,
        identifier: &str,
        origin: &str,
        at: OffsetDateTime,
    ) -> AuthResult<LockStatus> {
        let key = LockoutKey::new(identifier, origin);
        self.store.reserve_failure(&key, at, &self.policy).await
    }

    /// Lock state now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn is_locked(&self, identifier: &str, origin: &str) -> AuthResult<LockStatus> {
        self.is_locked_at(identifier, origin, OffsetDateTime::now_utc())
            .await
    }

    /// Lock state as of `now`. Clears the bucket once a lock has run out.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn is_locked_at(
        &self,
        identifier: &str,
        origin: &str,
        now: OffsetDateTime,
    ) -> AuthResult<LockStatus> {
        let key = LockoutKey::new(identifier, origin);
        let attempts = self
            .store
            .attempts_since(&key, now - self.policy.window)
            .await?;

        match self.policy.evaluate(&attempts, now) {
            BucketState::Locked { unlock_at } => Ok(LockStatus::locked(unlock_at)),
            BucketState::LockExpired => {
                tracing::info!(
                    identifier = %key.identifier,
                    origin = %key.origin,
                    "Lockout expired, clearing attempts"
                );
                self.store.clear(&key).await?;
                Ok(LockStatus::open(self.policy.max_attempts))
            }
            BucketState::Open { failures } => Ok(LockStatus::open(
                self.policy.max_attempts.saturating_sub(failures),
            )),
        }
    }

    /// Forgets all attempts of the bucket. Called after a successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear_attempts(&self, identifier: &str, origin: &str) -> AuthResult<()> {
        self.store.clear(&LockoutKey::new(identifier, origin)).await
    }

    /// Drops buckets with no attempt inside the window.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn sweep(&self) -> AuthResult<u64> {
        let horizon = self.policy.window.max(self.policy.lockout_duration);
        self.store.sweep(OffsetDateTime::now_utc() - horizon).await
    }
}
