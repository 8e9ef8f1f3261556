// geowarden/src/detectors/mod.rs
//
// Heuristic rule set. Every rule is a plain function over a read-only
// DetectionContext and returns at most one alert. All rules run on every
// event, in the fixed order of RULES, and any subset may fire together.
// Rules never touch shared state: the engine takes the history snapshot,
// bumps the update counter, and appends the event afterwards.

pub mod accuracy;
pub mod identical_coords;
pub mod rapid_updates;
pub mod robotic_timing;
pub mod speed;
pub mod teleport;

use crate::events::{AlertType, FraudAlert, LocationEvent};

// ── Thresholds ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub max_speed_kmh:         f64, // fastest plausible human movement
    pub min_speed_gap_secs:    f64, // shorter gaps are left to teleportation
    pub teleport_km:           f64,
    pub teleport_secs:         f64,
    pub max_updates:           u64, // per update window
    pub update_window_secs:    u64,
    pub max_accuracy_m:        f64, // worse accuracy = possible spoofing
    pub pattern_window:        usize,
    pub min_pattern_events:    usize,
    pub identical_epsilon_deg: f64,
    pub min_identical:         usize,
    pub max_timing_variance:   f64, // ms²
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh:         50.0,
            min_speed_gap_secs:    5.0,
            teleport_km:           1.0,
            teleport_secs:         3.0,
            max_updates:           20,
            update_window_secs:    60,
            max_accuracy_m:        100.0,
            pattern_window:        10,
            min_pattern_events:    5,
            identical_epsilon_deg: 1e-6,
            min_identical:         4,
            max_timing_variance:   1000.0,
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

pub struct DetectionContext<'a> {
    pub event:        &'a LocationEvent,
    /// Most recent prior events for this user, arrival order, newest last.
    /// Does not contain `event`.
    pub history:      &'a [LocationEvent],
    /// Windowed update count including `event`; None if the counter store
    /// could not be reached.
    pub update_count: Option<u64>,
    pub now_ms:       i64,
    pub config:       &'a DetectionConfig,
}

impl<'a> DetectionContext<'a> {
    pub fn previous(&self) -> Option<&'a LocationEvent> {
        self.history.last()
    }

    /// The last `pattern_window` history entries.
    pub fn pattern_window(&self) -> &'a [LocationEvent] {
        let skip = self.history.len().saturating_sub(self.config.pattern_window);
        &self.history[skip..]
    }

    pub fn secs_since(&self, prev: &LocationEvent) -> f64 {
        (self.event.timestamp - prev.timestamp) as f64 / 1000.0
    }

    pub fn location(&self) -> Option<(f64, f64)> {
        Some(self.event.coordinates())
    }
}

// ── Rule set ──────────────────────────────────────────────────────────────────

pub type Rule = fn(&DetectionContext<'_>) -> Option<FraudAlert>;

pub const RULES: &[(AlertType, Rule)] = &[
    (AlertType::ImpossibleSpeed,      speed::analyze),
    (AlertType::Teleportation,        teleport::analyze),
    (AlertType::RapidLocationUpdates, rapid_updates::analyze),
    (AlertType::PoorGpsAccuracy,      accuracy::analyze),
    (AlertType::IdenticalCoordinates, identical_coords::analyze),
    (AlertType::RoboticTiming,        robotic_timing::analyze),
];

/// Run every rule and collect the alerts that fired.
pub fn run_all(ctx: &DetectionContext<'_>) -> Vec<FraudAlert> {
    RULES.iter().filter_map(|(_, rule)| rule(ctx)).collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn rule_order_is_fixed_and_complete() {
        let kinds: Vec<AlertType> = RULES.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![
            AlertType::ImpossibleSpeed,
            AlertType::Teleportation,
            AlertType::RapidLocationUpdates,
            AlertType::PoorGpsAccuracy,
            AlertType::IdenticalCoordinates,
            AlertType::RoboticTiming,
        ]);
    }

    #[test]
    fn quiet_event_raises_nothing() {
        let cfg     = DetectionConfig::default();
        let history = vec![at(T0, 40.0, -74.0)];
        let event   = at(T0 + 60_000, 40.0001, -74.0);
        assert!(run_all(&ctx(&event, &history, &cfg)).is_empty());
    }

    #[test]
    fn independent_rules_fire_together() {
        let cfg     = DetectionConfig::default();
        let history = vec![at(T0, 40.0, -74.0)];
        // 2 km in 2 s with terrible accuracy, 25th update this minute
        let mut event = at(T0 + 2_000, 40.018, -74.0);
        event.accuracy = 500.0;
        let mut c = ctx(&event, &history, &cfg);
        c.update_count = Some(25);

        let kinds: Vec<AlertType> = run_all(&c).iter().map(|a| a.alert_type).collect();
        assert_eq!(kinds, vec![
            AlertType::Teleportation,
            AlertType::RapidLocationUpdates,
            AlertType::PoorGpsAccuracy,
        ]);
    }

    #[test]
    fn scores_stay_in_range() {
        let cfg     = DetectionConfig::default();
        let history = vec![at(T0, 0.0, 0.0)];
        let mut event = at(T0 + 10_000, 60.0, 120.0);
        event.accuracy = 1e9;
        let mut c = ctx(&event, &history, &cfg);
        c.update_count = Some(u64::MAX);
        for alert in run_all(&c) {
            assert!(alert.risk_score <= 100);
        }
    }
}
