// geowarden/src/detectors/speed.rs
//
// Impossible speed: distance over elapsed time since the previous event.
// Gaps of `min_speed_gap_secs` or less are left to the teleportation rule;
// non-positive gaps (clock skew, duplicates) are skipped.
//
// Score: 50 + (speed − max_speed), capped at 95.

use crate::detectors::DetectionContext;
use crate::events::{AlertType, FraudAlert};
use crate::geo::distance_km;

const BASE_SCORE: f64 = 50.0;
const MAX_SCORE:  f64 = 95.0;

pub fn analyze(ctx: &DetectionContext<'_>) -> Option<FraudAlert> {
    let prev = ctx.previous()?;
    let cfg  = ctx.config;

    let dt = ctx.secs_since(prev);
    if dt <= 0.0 { return None; }

    let distance = distance_km(prev.latitude, prev.longitude, ctx.event.latitude, ctx.event.longitude);
    if distance.is_nan() { return None; }

    let speed_kmh = distance / (dt / 3600.0);
    if speed_kmh <= cfg.max_speed_kmh || dt <= cfg.min_speed_gap_secs {
        return None;
    }

    let score = (BASE_SCORE + (speed_kmh - cfg.max_speed_kmh)).min(MAX_SCORE);

    Some(
        FraudAlert::new(&ctx.event.user_id, AlertType::ImpossibleSpeed, score, ctx.event.timestamp, ctx.location())
            .with_detail("calculated_speed_kmh", speed_kmh)
            .with_detail("distance_km", distance)
            .with_detail("time_diff_seconds", dt)
            .with_detail("max_allowed_speed", cfg.max_speed_kmh),
    )
}
