// geowarden/src/detectors/teleport.rs
//
// Teleportation: a jump of more than `teleport_km` within `teleport_secs`
// of the previous event. Independent of impossible_speed; both can fire.

use crate::detectors::DetectionContext;
use crate::events::{AlertType, FraudAlert};
use crate::geo::distance_km;

const SCORE: f64 = 90.0;

pub fn analyze(ctx: &DetectionContext<'_>) -> Option<FraudAlert> {
    let prev = ctx.previous()?;
    let cfg  = ctx.config;

    let distance = distance_km(prev.latitude, prev.longitude, ctx.event.latitude, ctx.event.longitude);
    if distance.is_nan() { return None; }

    let dt = ctx.secs_since(prev);
    if distance <= cfg.teleport_km || dt >= cfg.teleport_secs {
        return None;
    }

    Some(
        FraudAlert::new(&ctx.event.user_id, AlertType::Teleportation, SCORE, ctx.event.timestamp, ctx.location())
            .with_detail("distance_km", distance)
            .with_detail("time_diff_seconds", dt)
            .with_detail("threshold_km", cfg.teleport_km)
            .with_detail("threshold_seconds", cfg.teleport_secs),
    )
}
