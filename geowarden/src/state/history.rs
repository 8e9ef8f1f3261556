// geowarden/src/state/history.rs
//
// Per-user location history.
// DashMap = sharded concurrent HashMap; each user gets its own mutex so
// that "snapshot for detection, then append" happens atomically per user
// even if one user's events arrive on several partitions.
//
// Design:
//   - Bounded ring buffer per user (VecDeque, capacity N, oldest evicted)
//   - Arrival order, not timestamp order
//   - Optional LRU cap on the number of users, enforced by housekeeping

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::events::LocationEvent;

pub const DEFAULT_HISTORY_SIZE: usize = 50;

// ── Per-user buffer ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct UserHistory {
    capacity:  usize,
    events:    VecDeque<LocationEvent>,
    /// Store-wide sequence number of the last append (LRU ordering).
    last_seq:  u64,
}

impl UserHistory {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events:   VecDeque::with_capacity(capacity.min(64)),
            last_seq: 0,
        }
    }

    pub fn push(&mut self, event: LocationEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Up to `count` most recent events, newest last.
    pub fn recent(&self, count: usize) -> Vec<LocationEvent> {
        let skip = self.events.len().saturating_sub(count);
        self.events.iter().skip(skip).cloned().collect()
    }

}

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct HistoryStore {
    users:     DashMap<String, Arc<Mutex<UserHistory>>>,
    capacity:  usize,
    max_users: usize, // 0 = unbounded
    seq:       AtomicU64,
}

impl HistoryStore {
    pub fn new(capacity: usize, max_users: usize) -> Self {
        Self {
            users: DashMap::new(),
            capacity,
            max_users,
            seq: AtomicU64::new(0),
        }
    }

    fn user(&self, user_id: &str) -> Arc<Mutex<UserHistory>> {
        if let Some(h) = self.users.get(user_id) {
            return Arc::clone(h.value());
        }
        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserHistory::new(self.capacity))))
            .clone()
    }

    #[cfg(test)]
    pub fn append(&self, user_id: &str, event: LocationEvent) {
        self.with_user(user_id, |h| h.push(event));
    }

    /// Empty for unknown users.
    #[cfg(test)]
    pub fn recent(&self, user_id: &str, count: usize) -> Vec<LocationEvent> {
        let user = self.users.get(user_id).map(|h| Arc::clone(h.value()));
        user.map(|h| h.lock().recent(count)).unwrap_or_default()
    }

    /// Run `f` with exclusive access to one user's history. The buffer is
    /// created on first use. Counts as an access for LRU purposes.
    pub fn with_user<R>(&self, user_id: &str, f: impl FnOnce(&mut UserHistory) -> R) -> R {
        loop {
            let user  = self.user(user_id);
            let mut h = user.lock();
            // evicted while we waited for the lock: start over on a live entry
            let live = self.users.get(user_id)
                .map_or(false, |cur| Arc::ptr_eq(cur.value(), &user));
            if !live {
                continue;
            }
            h.last_seq = self.seq.fetch_add(1, Ordering::Relaxed);
            return f(&mut h);
        }
    }

    pub fn n_users(&self) -> usize {
        self.users.len()
    }

    /// Evict least-recently-updated users until the store is within
    /// `max_users`. Returns the number evicted.
    pub fn evict_lru(&self) -> usize {
        if self.max_users == 0 || self.users.len() <= self.max_users {
            return 0;
        }
        let evicted = self.evict_idle(self.lru_candidates());
        debug!("History LRU evicted {} users", evicted);
        evicted
    }

    /// Oldest-first `(last_seq, user)` pairs beyond `max_users`. Users whose
    /// buffer is locked right now are in use and never candidates.
    fn lru_candidates(&self) -> Vec<(u64, String)> {
        let mut by_age: Vec<(u64, String)> = self.users.iter()
            .filter_map(|e| e.value().try_lock().map(|h| (h.last_seq, e.key().clone())))
            .collect();
        by_age.sort_unstable();
        let excess = self.users.len().saturating_sub(self.max_users);
        by_age.truncate(excess);
        by_age
    }

    /// Remove each candidate only if it has not been touched since it was
    /// picked. The check and the removal happen under the map's shard lock.
    fn evict_idle(&self, candidates: Vec<(u64, String)>) -> usize {
        candidates.into_iter()
            .filter(|(seq, user_id)| {
                self.users
                    .remove_if(user_id, |_, h| h.try_lock().map_or(false, |g| g.last_seq == *seq))
                    .is_some()
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(user: &str, ts: i64) -> LocationEvent {
        LocationEvent {
            user_id:    user.to_string(),
            timestamp:  ts,
            latitude:   1.0,
            longitude:  2.0,
            accuracy:   5.0,
            speed:      None,
            platform:   "ios".into(),
            session_id: "s".into(),
            device_id:  "d".into(),
        }
    }

    #[test]
    fn unknown_user_has_empty_history() {
        let store = HistoryStore::new(DEFAULT_HISTORY_SIZE, 0);
        assert!(store.recent("nobody", 10).is_empty());
        assert_eq!(store.n_users(), 0);
    }

    #[test]
    fn bounded_and_oldest_evicted_first() {
        let store = HistoryStore::new(3, 0);
        for ts in 0..5 {
            store.append("u", ev("u", ts));
        }
        let ts: Vec<i64> = store.recent("u", 10).iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![2, 3, 4]);
    }

    #[test]
    fn recent_returns_newest_last() {
        let store = HistoryStore::new(10, 0);
        for ts in 0..6 {
            store.append("u", ev("u", ts));
        }
        let ts: Vec<i64> = store.recent("u", 2).iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![4, 5]);
    }

    #[test]
    fn keeps_arrival_order_not_timestamp_order() {
        let store = HistoryStore::new(10, 0);
        store.append("u", ev("u", 30));
        store.append("u", ev("u", 10));
        store.append("u", ev("u", 20));
        let ts: Vec<i64> = store.recent("u", 10).iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![30, 10, 20]);
    }

    #[test]
    fn users_are_isolated() {
        let store = HistoryStore::new(10, 0);
        store.append("a", ev("a", 1));
        store.append("b", ev("b", 2));
        assert_eq!(store.recent("a", 10).len(), 1);
        assert_eq!(store.recent("b", 10)[0].timestamp, 2);
    }

    #[test]
    fn lru_evicts_least_recently_updated() {
        let store = HistoryStore::new(10, 2);
        store.append("a", ev("a", 1));
        store.append("b", ev("b", 1));
        store.append("c", ev("c", 1));
        store.append("a", ev("a", 2)); // a is now fresher than b

        assert_eq!(store.evict_lru(), 1);
        assert_eq!(store.n_users(), 2);
        assert!(store.recent("b", 10).is_empty());
        assert_eq!(store.recent("a", 10).len(), 2);
    }

    #[test]
    fn user_touched_after_selection_is_not_evicted() {
        let store = HistoryStore::new(10, 1);
        store.append("a", ev("a", 1));
        store.append("b", ev("b", 1));

        let candidates = store.lru_candidates();
        assert_eq!(candidates.iter().map(|(_, u)| u.as_str()).collect::<Vec<_>>(), vec!["a"]);

        store.append("a", ev("a", 2));
        assert_eq!(store.evict_idle(candidates), 0);
        assert_eq!(store.recent("a", 10).len(), 2);
        assert_eq!(store.n_users(), 2);
    }

    #[test]
    fn user_in_use_is_skipped() {
        let store = HistoryStore::new(10, 1);
        store.append("a", ev("a", 1));
        store.append("b", ev("b", 1));

        let a = store.user("a");
        let guard = a.lock();
        assert_eq!(store.evict_lru(), 1);
        drop(guard);

        assert_eq!(store.recent("a", 10).len(), 1);
        assert!(store.recent("b", 10).is_empty());
    }

    #[test]
    fn append_racing_an_eviction_is_not_lost() {
        let store = Arc::new(HistoryStore::new(10, 0));
        store.append("a", ev("a", 1));

        let held  = store.user("a");
        let guard = held.lock();
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.append("a", ev("a", 2)))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        store.users.remove("a");
        drop(guard);
        writer.join().unwrap();

        let ts: Vec<i64> = store.recent("a", 10).iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![2]);
    }

    #[test]
    fn concurrent_appends_are_serialized_per_user() {
        let store = Arc::new(HistoryStore::new(1000, 0));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.append("shared", ev("shared", t * 1000 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.recent("shared", usize::MAX).len(), 800);
    }
}
