// geowarden/src/detectors/accuracy.rs
//
// Poor GPS accuracy: a stateless single-event check. Spoofing apps often
// report coarse or fabricated accuracy radii.

use crate::detectors::DetectionContext;
use crate::events::{AlertType, FraudAlert};

const SCORE: f64 = 40.0;

pub fn analyze(ctx: &DetectionContext<'_>) -> Option<FraudAlert> {
    let accuracy = ctx.event.accuracy;
    if accuracy.is_nan() || accuracy <= ctx.config.max_accuracy_m {
        return None;
    }

    Some(
        FraudAlert::new(&ctx.event.user_id, AlertType::PoorGpsAccuracy, SCORE, ctx.event.timestamp, ctx.location())
            .with_detail("accuracy_meters", accuracy)
            .with_detail("threshold_meters", ctx.config.max_accuracy_m),
    )
}
