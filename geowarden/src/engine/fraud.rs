// geowarden/src/engine/fraud.rs
//
// Per-event detection:
//   1. bump the user's windowed update counter (once per event, always)
//   2. lock the user's history, snapshot it, run the rule set
//   3. append the event under the same lock
//
// Step 1 may block on a remote store and runs before the lock; steps 2 and 3
// are synchronous, so a concurrent event for the same user sees either the
// history before this event or after it, never a partial state.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::detectors::{self, rapid_updates, DetectionConfig, DetectionContext};
use crate::events::{FraudAlert, LocationEvent};
use crate::state::counter::CounterStore;
use crate::state::history::HistoryStore;

pub struct FraudEngine {
    history:  Arc<HistoryStore>,
    counters: Arc<dyn CounterStore>,
    clock:    Arc<dyn Clock>,
    config:   DetectionConfig,
}

impl FraudEngine {
    pub fn new(
        history:  Arc<HistoryStore>,
        counters: Arc<dyn CounterStore>,
        clock:    Arc<dyn Clock>,
        config:   DetectionConfig,
    ) -> Self {
        Self { history, counters, clock, config }
    }

    /// Evaluate one event and record it in the user's history.
    pub async fn analyze(&self, event: &LocationEvent) -> Vec<FraudAlert> {
        let now = self.clock.now();

        let update_count = match self.counters
            .increment_and_count(
                &rapid_updates::counter_key(&event.user_id),
                self.config.update_window_secs,
                now,
            )
            .await
        {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(user_id = %event.user_id, "Update counter unavailable, rapid-update check skipped: {}", e);
                None
            }
        };

        let lookback = self.config.pattern_window.max(1);
        let alerts = self.history.with_user(&event.user_id, |h| {
            let snapshot = h.recent(lookback);
            let ctx = DetectionContext {
                event,
                history: &snapshot,
                update_count,
                now_ms: now.timestamp_millis(),
                config: &self.config,
            };
            let alerts = detectors::run_all(&ctx);
            h.push(event.clone());
            alerts
        });

        if !alerts.is_empty() {
            debug!(user_id = %event.user_id, "{} rule(s) fired", alerts.len());
        }
        alerts
    }
}
