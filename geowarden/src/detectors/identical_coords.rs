// geowarden/src/detectors/identical_coords.rs
//
// Identical coordinates: real GPS jitters. A spoofed fix repeats the exact
// same coordinate. Counts how many of the last `pattern_window` history
// entries sit within `identical_epsilon_deg` of the current fix on both
// axes; needs at least `min_pattern_events` entries to judge.

use crate::detectors::DetectionContext;
use crate::events::{AlertType, FraudAlert};

const SCORE: f64 = 75.0;

pub fn analyze(ctx: &DetectionContext<'_>) -> Option<FraudAlert> {
    let cfg    = ctx.config;
    let window = ctx.pattern_window();
    if window.len() < cfg.min_pattern_events {
        return None;
    }

    let (lat, lon) = ctx.event.coordinates();
    let identical_count = window.iter()
        .filter(|e| (e.latitude - lat).abs() < cfg.identical_epsilon_deg
                 && (e.longitude - lon).abs() < cfg.identical_epsilon_deg)
        .count();

    if identical_count < cfg.min_identical {
        return None;
    }

    Some(
        FraudAlert::new(&ctx.event.user_id, AlertType::IdenticalCoordinates, SCORE, ctx.event.timestamp, ctx.location())
            .with_detail("identical_count", identical_count as u64)
            .with_detail("coordinate", format!("{},{}", lat, lon)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::fixtures::*;
    use crate::detectors::DetectionConfig;

    fn jittered(n: usize) -> Vec<crate::events::LocationEvent> {
        (0..n)
            .map(|i| at(T0 + i as i64 * 7_000, 51.5 + i as f64 * 1e-4, -0.12))
            .collect()
    }

    #[test]
    fn ten_identical_plus_one() {
        let cfg     = DetectionConfig::default();
        let history: Vec<_> = (0..10).map(|i| at(T0 + i * 5_000, 51.5, -0.12)).collect();
        let event   = at(T0 + 50_000, 51.5, -0.12);

        let alert = analyze(&ctx(&event, &history, &cfg)).unwrap();
        assert_eq!(alert.alert_type, AlertType::IdenticalCoordinates);
        assert_eq!(alert.risk_score, 75);
        assert_eq!(alert.details["identical_count"], 10);
        assert_eq!(alert.details["coordinate"], "51.5,-0.12");
    }

    #[test]
    fn only_the_last_window_is_examined() {
        let cfg = DetectionConfig::default();
        // 10 identical fixes followed by 10 distinct ones: none of the
        // identical ones are in the examined window any more
        let mut history: Vec<_> = (0..10).map(|i| at(T0 + i * 5_000, 51.5, -0.12)).collect();
        history.extend(jittered(10).into_iter().map(|mut e| { e.latitude += 1.0; e }));
        let event = at(T0 + 200_000, 51.5, -0.12);
        assert!(analyze(&ctx(&event, &history, &cfg)).is_none());
    }

    #[test]
    fn needs_four_matches_and_five_entries() {
        let cfg = DetectionConfig::default();
        let event = at(T0 + 100_000, 51.5, -0.12);

        // 3 matches among 6
        let mut history = jittered(3);
        history.extend((0..3).map(|i| at(T0 + 30_000 + i * 5_000, 51.5, -0.12)));
        history[0].latitude = 10.0;
        assert!(analyze(&ctx(&event, &history, &cfg)).is_none());

        // 4 matches among 5
        let mut history = jittered(1);
        history[0].latitude = 10.0;
        history.extend((0..4).map(|i| at(T0 + 30_000 + i * 5_000, 51.5, -0.12)));
        assert!(analyze(&ctx(&event, &history, &cfg)).is_some());

        // 4 matches but only 4 entries
        let history: Vec<_> = (0..4).map(|i| at(T0 + i * 5_000, 51.5, -0.12)).collect();
        assert!(analyze(&ctx(&event, &history, &cfg)).is_none());
    }

    #[test]
    fn gps_jitter_is_not_identical() {
        let cfg     = DetectionConfig::default();
        let history = jittered(10);
        let event   = at(T0 + 100_000, 51.5, -0.12);
        let alert   = analyze(&ctx(&event, &history, &cfg));
        // only history[0] matches exactly
        assert!(alert.is_none());
    }
}
