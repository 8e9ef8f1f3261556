// geowarden/src/state/redis_store.rs
//
// Redis-backed shared state, used when several geowarden processes consume
// partitions of the same stream and must agree on counters and cooldowns.
//
// Data layout in Redis:
//   {prefix}{key}:{bucket}    INCR counter for one 10s bucket (EX = window, set once)
//   {prefix}alert:{user}:{type} "1" cooldown marker (EX = cooldown TTL, NX unless high-risk)
//   PUBLISH {channel}         alert notifications (see engine::dispatcher)
//
// Counter increments run as one MULTI/EXEC pipeline:
//   SET bucket 0 EX window NX   (creates the bucket with its expiry, once)
//   INCR bucket
//   MGET bucket … bucket-(n-1)
// so the increment and the window sum are linearizable per key.
//
// Failures surface as StoreError; callers degrade instead of aborting.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use tracing::info;

use crate::error::StoreError;
use crate::state::cooldown::CooldownStore;
use crate::state::counter::{bucket_of, buckets_in, CounterStore};

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url:        String, // redis://127.0.0.1:6379
    pub key_prefix: String, // "gw:" by default
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url:        "redis://127.0.0.1:6379".to_string(),
            key_prefix: "gw:".to_string(),
        }
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisStore {
    config: RedisConfig,
    conn:   ConnectionManager,
}

impl RedisStore {
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn   = client.get_connection_manager().await?;
        info!("Connected to Redis at {}", config.url);
        Ok(Self { config, conn })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// PUBLISH a payload on a pub/sub channel. Returns the receiver count.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_and_count(
        &self,
        key:         &str,
        window_secs: u64,
        now:         DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let current = bucket_of(now);
        let base    = self.key(key);
        let bucket_key = format!("{}:{}", base, current);
        let window_keys: Vec<String> = (0..buckets_in(window_secs))
            .map(|i| format!("{}:{}", base, current - i))
            .collect();

        let mut conn = self.conn.clone();
        let (counts,): (Vec<Option<u64>>,) = redis::pipe()
            .atomic()
            .cmd("SET").arg(&bucket_key).arg(0).arg("EX").arg(window_secs.max(1)).arg("NX").ignore()
            .cmd("INCR").arg(&bucket_key).ignore()
            .cmd("MGET").arg(&window_keys)
            .query_async(&mut conn)
            .await?;

        Ok(counts.into_iter().flatten().sum())
    }
}

#[async_trait]
impl CooldownStore for RedisStore {
    async fn try_arm(&self, key: &str, ttl: Duration, _now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(1)
            .arg("EX")
            .arg(ttl.num_seconds().max(1))
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn arm(&self, key: &str, ttl: Duration, _now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let secs = ttl.num_seconds().max(1);
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(1)
            .arg("EX")
            .arg(secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
