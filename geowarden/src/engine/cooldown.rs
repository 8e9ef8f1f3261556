// geowarden/src/engine/cooldown.rs
//
// Alert deduplication per (user, alert type).
//
//   no active marker            → dispatch, arm marker (one atomic step)
//   active marker, score <  90  → suppress
//   active marker, score >= 90  → dispatch anyway, re-arm marker
//
// Markers last `high_risk_cooldown` (60 s) when armed by a high-risk alert
// and `cooldown` (300 s) otherwise. The gate never changes detection
// results; it only decides whether an alert leaves the process.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::events::FraudAlert;
use crate::state::cooldown::CooldownStore;

#[derive(Debug, Clone)]
pub struct CooldownConfig {
    pub cooldown:           Duration,
    pub high_risk_cooldown: Duration,
    pub high_risk_score:    u8,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cooldown:           Duration::seconds(300),
            high_risk_cooldown: Duration::seconds(60),
            high_risk_score:    90,
        }
    }
}

pub struct CooldownGate {
    store:  Arc<dyn CooldownStore>,
    clock:  Arc<dyn Clock>,
    config: CooldownConfig,
}

impl CooldownGate {
    pub fn new(store: Arc<dyn CooldownStore>, clock: Arc<dyn Clock>, config: CooldownConfig) -> Self {
        Self { store, clock, config }
    }

    fn is_high_risk(&self, alert: &FraudAlert) -> bool {
        alert.risk_score >= self.config.high_risk_score
    }

    fn ttl_for(&self, alert: &FraudAlert) -> Duration {
        if self.is_high_risk(alert) {
            self.config.high_risk_cooldown
        } else {
            self.config.cooldown
        }
    }

    /// Decide whether `alert` may be dispatched, arming its cooldown when it
    /// may. The check and the arm are one store operation, so concurrent
    /// workers cannot both pass the gate for the same key. Store failures
    /// fail open.
    pub async fn should_dispatch(&self, alert: &FraudAlert) -> bool {
        let key = alert.cooldown_key();
        let now = self.clock.now();
        let ttl = self.ttl_for(alert);

        if self.is_high_risk(alert) {
            if let Err(e) = self.store.arm(&key, ttl, now).await {
                warn!(key = %key, "Failed to arm cooldown: {}", e);
            }
            return true;
        }

        match self.store.try_arm(&key, ttl, now).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(key = %key, score = alert.risk_score, "Alert suppressed by cooldown");
                false
            }
            Err(e) => {
                warn!(key = %key, "Cooldown store unavailable, dispatching: {}", e);
                true
            }
        }
    }
}
