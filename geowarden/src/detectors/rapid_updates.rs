// geowarden/src/detectors/rapid_updates.rs
//
// Rapid location updates: more than `max_updates` events for one user in
// the trailing update window. The count comes from the shared windowed
// counter, which the engine bumps once per evaluated event.

use crate::detectors::DetectionContext;
use crate::events::{AlertType, FraudAlert};

const SCORE: f64 = 70.0;

/// Counter key for a user's location updates.
pub fn counter_key(user_id: &str) -> String {
    format!("location_updates:{}", user_id)
}

pub fn analyze(ctx: &DetectionContext<'_>) -> Option<FraudAlert> {
    let count = ctx.update_count?;
    if count <= ctx.config.max_updates {
        return None;
    }

    Some(
        FraudAlert::new(&ctx.event.user_id, AlertType::RapidLocationUpdates, SCORE, ctx.now_ms, None)
            .with_detail("updates_per_minute", count)
            .with_detail("threshold", ctx.config.max_updates),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::fixtures::*;
    use crate::detectors::DetectionConfig;

    #[test]
    fn fires_strictly_above_threshold() {
        let cfg   = DetectionConfig::default();
        let event = at(T0, 0.0, 0.0);

        let mut c = ctx(&event, &[], &cfg);
        c.update_count = Some(20);
        assert!(analyze(&c).is_none());

        c.update_count = Some(21);
        c.now_ms = T0 + 123;
        let alert = analyze(&c).unwrap();
        assert_eq!(alert.risk_score, 70);
        assert_eq!(alert.timestamp, T0 + 123);
        assert_eq!(alert.location, None);
        assert_eq!(alert.details["updates_per_minute"], 21);
    }

    #[test]
    fn unknown_count_is_skipped() {
        let cfg   = DetectionConfig::default();
        let event = at(T0, 0.0, 0.0);
        let mut c = ctx(&event, &[], &cfg);
        c.update_count = None;
        assert!(analyze(&c).is_none());
    }
}
