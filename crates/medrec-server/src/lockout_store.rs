//! Redis-backed lockout buckets for multi-instance deployments.
//!
//! Each (identifier, origin) bucket is a sorted set scored by attempt time
//! in milliseconds. Members encode the exact timestamp and outcome plus a
//! random suffix so simultaneous attempts never collapse into one entry.
//! Buckets carry a TTL of `max(window, lockout_duration)`, so idle buckets
//! expire without a sweep.
//!
//! Failure reservation runs as one Lua script, so the lock check and the
//! append are atomic across every instance sharing the bucket.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;
use medrec_auth::config::LockoutConfig;
use medrec_auth::lockout::{Attempt, LockStatus, LockoutKey, LockoutPolicy, LockoutStore};
use medrec_auth::{AuthError, AuthResult};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::RedisConfig;

/// Attempts kept per bucket beyond which the oldest are dropped.
const MAX_BUCKET_LEN: isize = 256;

/// KEYS[1] bucket. ARGV: now score, window floor score, max attempts,
/// lockout duration in ms, new member, TTL seconds, max bucket length.
///
/// Returns `{1, oldest counted member}` when locked (nothing appended),
/// otherwise `{0, counted failures including the new one}`.
const RESERVE_FAILURE_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local floor = tonumber(ARGV[2])
redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. floor)

local entries = redis.call('ZRANGEBYSCORE', key, floor, now, 'WITHSCORES')
local failures = 0
local oldest = nil
local oldest_score = nil
for i = 1, #entries, 2 do
  local success = string.match(entries[i], '^%-?%d+:(%d):')
  if success == '1' then
    failures = 0
    oldest = nil
    oldest_score = nil
  elseif success == '0' then
    failures = failures + 1
    if oldest == nil then
      oldest = entries[i]
      oldest_score = tonumber(entries[i + 1])
    end
  end
end

if failures >= tonumber(ARGV[3]) and oldest ~= nil then
  if now < oldest_score + tonumber(ARGV[4]) then
    return {1, oldest}
  end
  redis.call('DEL', key)
  failures = 0
end

redis.call('ZADD', key, now, ARGV[5])
redis.call('ZREMRANGEBYRANK', key, 0, -(tonumber(ARGV[7]) + 1))
redis.call('EXPIRE', key, ARGV[6])
return {0, tostring(failures + 1)}
";

/// Create a Redis pool from configuration and check that it connects.
pub async fn create_redis_pool(config: &RedisConfig) -> Result<Pool, String> {
    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Duration::from_millis(config.timeout_ms);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(config.pool_size));
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let pool = redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| format!("failed to create Redis pool: {e}"))?;

    pool.get()
        .await
        .map_err(|e| format!("failed to connect to Redis: {e}"))?;
    tracing::info!("Connected to Redis");
    Ok(pool)
}

/// [`LockoutStore`] on Redis sorted sets.
#[derive(Clone)]
pub struct RedisLockoutStore {
    pool: Pool,
    prefix: String,
    retention_secs: i64,
    reserve_script: redis::Script,
}

impl RedisLockoutStore {
    pub fn new(pool: Pool, prefix: impl Into<String>, lockout: &LockoutConfig) -> Self {
        let retention = lockout.window.max(lockout.lockout_duration);
        Self {
            pool,
            prefix: prefix.into(),
            retention_secs: i64::try_from(retention.as_secs().max(1)).unwrap_or(i64::MAX),
            reserve_script: redis::Script::new(RESERVE_FAILURE_SCRIPT),
        }
    }

    fn key(&self, key: &LockoutKey) -> String {
        bucket_key(&self.prefix, key)
    }

    async fn connection(&self) -> AuthResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AuthError::storage(format!("redis pool: {e}")))
    }
}

#[async_trait]
impl LockoutStore for RedisLockoutStore {
    async fn record(
        &self,
        key: &LockoutKey,
        attempt: Attempt,
        window: time::Duration,
    ) -> AuthResult<()> {
        let redis_key = self.key(key);
        let floor = score_of(attempt.at - window);
        let mut conn = self.connection().await?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg("-inf")
            .arg(format!("({floor}"))
            .ignore()
            .cmd("ZADD")
            .arg(&redis_key)
            .arg(score_of(attempt.at))
            .arg(encode_member(&attempt))
            .ignore()
            .cmd("ZREMRANGEBYRANK")
            .arg(&redis_key)
            .arg(0)
            .arg(-(MAX_BUCKET_LEN + 1))
            .ignore()
            .cmd("EXPIRE")
            .arg(&redis_key)
            .arg(self.retention_secs)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn reserve_failure(
        &self,
        key: &LockoutKey,
        at: OffsetDateTime,
        policy: &LockoutPolicy,
    ) -> AuthResult<LockStatus> {
        let redis_key = self.key(key);
        let member = encode_member(&Attempt { at, success: false });
        let lockout_ms = i64::try_from(policy.lockout_duration.whole_milliseconds())
            .unwrap_or(i64::MAX);
        let mut conn = self.connection().await?;

        let (locked, detail): (i64, String) = self
            .reserve_script
            .key(&redis_key)
            .arg(score_of(at))
            .arg(score_of(at - policy.window))
            .arg(policy.max_attempts)
            .arg(lockout_ms)
            .arg(member)
            .arg(self.retention_secs)
            .arg(MAX_BUCKET_LEN)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;

        reservation_status(locked, &detail, policy)
    }

    async fn attempts_since(
        &self,
        key: &LockoutKey,
        since: OffsetDateTime,
    ) -> AuthResult<Vec<Attempt>> {
        let redis_key = self.key(key);
        let mut conn = self.connection().await?;
        let members: Vec<String> = conn
            .zrangebyscore(&redis_key, score_of(since), "+inf")
            .await
            .map_err(redis_error)?;

        let mut attempts: Vec<Attempt> = members
            .iter()
            .filter_map(|m| decode_member(m))
            .filter(|a| a.at >= since)
            .collect();
        attempts.sort_by_key(|a| a.at);
        Ok(attempts)
    }

    async fn clear(&self, key: &LockoutKey) -> AuthResult<()> {
        let redis_key = self.key(key);
        let mut conn = self.connection().await?;
        let _: () = conn.del(&redis_key).await.map_err(redis_error)?;
        Ok(())
    }

    async fn sweep(&self, _cutoff: OffsetDateTime) -> AuthResult<u64> {
        // Buckets expire through their TTL.
        Ok(0)
    }
}

fn redis_error(err: redis::RedisError) -> AuthError {
    AuthError::storage(format!("redis: {err}"))
}

/// Maps the reservation script reply onto a [`LockStatus`].
fn reservation_status(locked: i64, detail: &str, policy: &LockoutPolicy) -> AuthResult<LockStatus> {
    if locked == 1 {
        let oldest = decode_member(detail)
            .ok_or_else(|| AuthError::storage("redis: malformed lockout member"))?;
        return Ok(LockStatus::locked(oldest.at + policy.lockout_duration));
    }
    let failures: u32 = detail
        .parse()
        .map_err(|_| AuthError::storage("redis: malformed reservation count"))?;
    Ok(LockStatus::open(policy.max_attempts.saturating_sub(failures)))
}

/// `<prefix>:<hex identifier>:<hex origin>`; hex keeps `:` in IPv6
/// origins from colliding with the separator.
fn bucket_key(prefix: &str, key: &LockoutKey) -> String {
    format!(
        "{prefix}:{}:{}",
        hex::encode(key.identifier.as_bytes()),
        hex::encode(key.origin.as_bytes())
    )
}

fn score_of(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn encode_member(attempt: &Attempt) -> String {
    format!(
        "{}:{}:{}",
        attempt.at.unix_timestamp_nanos(),
        u8::from(attempt.success),
        Uuid::new_v4().simple()
    )
}

fn decode_member(member: &str) -> Option<Attempt> {
    let mut parts = member.splitn(3, ':');
    let nanos: i128 = parts.next()?.parse().ok()?;
    let success = match parts.next()? {
        "1" => true,
        "0" => false,
        _ => return None,
    };
    let at = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    Some(Attempt { at, success })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_member_roundtrip_keeps_nanoseconds() {
        let attempt = Attempt {
            at: datetime!(2026-03-02 08:15:30.123_456_789 UTC),
            success: false,
        };
        let member = encode_member(&attempt);
        assert_eq!(decode_member(&member), Some(attempt));
    }

    #[test]
    fn test_simultaneous_members_differ() {
        let attempt = Attempt {
            at: datetime!(2026-03-02 08:15 UTC),
            success: true,
        };
        assert_ne!(encode_member(&attempt), encode_member(&attempt));
    }

    #[test]
    fn test_garbage_member_ignored() {
        assert_eq!(decode_member("not-a-member"), None);
        assert_eq!(decode_member("123:2:abc"), None);
    }

    #[test]
    fn test_bucket_key_hex_encodes_ipv6_origin() {
        let key = LockoutKey::new("Dr.House", "2001:db8::1");
        let encoded = bucket_key("medrec:lockout", &key);
        assert_eq!(encoded.matches(':').count(), 3);
        assert!(encoded.starts_with("medrec:lockout:"));
        assert!(encoded.contains(&hex::encode("dr.house")));
    }

    fn policy() -> LockoutPolicy {
        LockoutPolicy::from_config(&LockoutConfig::default())
    }

    #[test]
    fn test_locked_reply_unlocks_after_oldest_failure() {
        let oldest = Attempt {
            at: datetime!(2026-03-02 08:00 UTC),
            success: false,
        };
        let status = reservation_status(1, &encode_member(&oldest), &policy()).unwrap();
        assert_eq!(status, LockStatus::locked(datetime!(2026-03-02 08:15 UTC)));
    }

    #[test]
    fn test_open_reply_reports_remaining() {
        assert_eq!(
            reservation_status(0, "1", &policy()).unwrap(),
            LockStatus::open(4)
        );
        assert_eq!(
            reservation_status(0, "5", &policy()).unwrap(),
            LockStatus::open(0)
        );
    }

    #[test]
    fn test_malformed_reply_is_storage_error() {
        assert!(matches!(
            reservation_status(1, "garbage", &policy()),
            Err(AuthError::Storage { .. })
        ));
        assert!(reservation_status(0, "many", &policy()).is_err());
    }

    #[test]
    fn test_script_matches_member_encoding() {
        // The script reads the outcome digit between the first two colons.
        let member = encode_member(&Attempt {
            at: datetime!(2026-03-02 08:00 UTC),
            success: false,
        });
        let mut parts = member.split(':');
        assert!(parts.next().unwrap().parse::<i128>().is_ok());
        assert_eq!(parts.next(), Some("0"));
        assert!(RESERVE_FAILURE_SCRIPT.contains("'^%-?%d+:(%d):'"));
    }

    #[test]
    fn test_score_is_milliseconds() {
        assert_eq!(score_of(datetime!(1970-01-01 00:00:01.5 UTC)), 1500);
    }
}
