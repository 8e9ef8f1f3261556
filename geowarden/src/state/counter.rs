// geowarden/src/state/counter.rs
//
// Windowed occurrence counters.
//
// A window of W seconds is the sum of floor(W / 10) ten-second buckets
// ending at the bucket for `now`. Every bucket expires W seconds after it
// was created, so stale buckets drop out without a sweep; the housekeeping
// loop only reclaims the memory.
//
//   key "location_updates:u1", W = 60, now = 12:00:37
//     buckets 12:00:30 12:00:20 12:00:10 12:00:00 11:59:50 11:59:40 → summed

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::StoreError;

pub const BUCKET_SECS: i64 = 10;

/// Index of the ten-second bucket containing `now`.
pub fn bucket_of(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(BUCKET_SECS)
}

/// Number of buckets covering a window. Floors, never below one.
pub fn buckets_in(window_secs: u64) -> i64 {
    ((window_secs as i64) / BUCKET_SECS).max(1)
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically count one occurrence of `key` at `now` and return the total
    /// over the trailing window, this occurrence included.
    async fn increment_and_count(
        &self,
        key:         &str,
        window_secs: u64,
        now:         DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

// ── In-process implementation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count:      u64,
    expires_at: i64, // unix seconds
}

#[derive(Debug, Default)]
struct KeyBuckets {
    buckets: BTreeMap<i64, Bucket>,
}

impl KeyBuckets {
    fn prune(&mut self, now_secs: i64) {
        self.buckets.retain(|_, b| b.expires_at > now_secs);
    }
}

#[derive(Default)]
pub struct MemoryCounterStore {
    // The DashMap shard write lock is held for the whole
    // increment-and-sum, which makes each key linearizable.
    keys: DashMap<String, KeyBuckets>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn count_at(&self, key: &str, window_secs: u64, now: DateTime<Utc>) -> u64 {
        let now_secs = now.timestamp();
        let current  = bucket_of(now);
        let oldest   = current - buckets_in(window_secs) + 1;
        self.keys.get(key)
            .map(|k| {
                k.buckets.range(oldest..=current)
                    .filter(|(_, b)| b.expires_at > now_secs)
                    .map(|(_, b)| b.count)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Drop expired buckets and empty keys. Returns the number of keys removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let now_secs = now.timestamp();
        let before   = self.keys.len();
        self.keys.retain(|_, k| {
            k.prune(now_secs);
            !k.buckets.is_empty()
        });
        before.saturating_sub(self.keys.len())
    }

    pub fn n_keys(&self) -> usize {
        self.keys.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_and_count(
        &self,
        key:         &str,
        window_secs: u64,
        now:         DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let now_secs = now.timestamp();
        let current  = bucket_of(now);
        let oldest   = current - buckets_in(window_secs) + 1;

        let mut entry = self.keys.entry(key.to_string()).or_default();
        entry.prune(now_secs);

        let bucket = entry.buckets.entry(current).or_insert(Bucket {
            count:      0,
            expires_at: now_secs + window_secs as i64,
        });
        bucket.count += 1;

        Ok(entry.buckets.range(oldest..=current).map(|(_, b)| b.count).sum())
    }
}
