// geowarden/src/state/cooldown.rs
//
// Cooldown markers keyed by "alert:{user_id}:{alert_type}".
// A marker is a deadline; it is active until the deadline passes and is
// re-armed (deadline moved) on every dispatch.
//
//   try_arm  check-and-set in one step; false if a live marker exists
//   arm      unconditional refresh (high-risk bypass)

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::StoreError;

#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// Arm the marker only if no unexpired one exists, atomically.
    /// Returns whether this call armed it.
    async fn try_arm(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Create or refresh the marker so it expires `ttl` after `now`.
    async fn arm(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryCooldownStore {
    deadlines: DashMap<String, DateTime<Utc>>,
}

impl MemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired markers. Returns the number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.deadlines.len();
        self.deadlines.retain(|_, deadline| *deadline > now);
        before.saturating_sub(self.deadlines.len())
    }

    pub fn n_active(&self) -> usize {
        self.deadlines.len()
    }
}

#[async_trait]
impl CooldownStore for MemoryCooldownStore {
    async fn try_arm(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool, StoreError> {
        match self.deadlines.entry(key.to_string()) {
            Entry::Occupied(mut live) if *live.get() <= now => {
                live.insert(now + ttl);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(now + ttl);
                Ok(true)
            }
        }
    }

    async fn arm(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.deadlines.insert(key.to_string(), now + ttl);
        Ok(())
    }
}
