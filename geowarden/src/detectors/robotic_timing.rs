// geowarden/src/detectors/robotic_timing.rs
//
// Robotic timing: scripted clients report on a fixed timer. Over the last
// `pattern_window` history entries (at least `min_pattern_events`), take the
// consecutive inter-arrival intervals in ms and compute their population
// variance. Variance under `max_timing_variance` (ms²) with a positive mean
// means the user's updates are clock-driven.

use crate::detectors::DetectionContext;
use crate::events::{AlertType, FraudAlert};

const SCORE: f64 = 80.0;

/// Population mean and variance.
fn mean_and_variance(vals: &[f64]) -> (f64, f64) {
    if vals.is_empty() {
        return (0.0, 0.0);
    }
    let n    = vals.len() as f64;
    let mean = vals.iter().sum::<f64>() / n;
    let var  = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

pub fn analyze(ctx: &DetectionContext<'_>) -> Option<FraudAlert> {
    let cfg    = ctx.config;
    let window = ctx.pattern_window();
    if window.len() < cfg.min_pattern_events {
        return None;
    }

    let intervals: Vec<f64> = window.windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp) as f64)
        .collect();
    if intervals.is_empty() {
        return None;
    }

    let (mean, variance) = mean_and_variance(&intervals);
    if variance >= cfg.max_timing_variance || mean <= 0.0 {
        return None;
    }

    Some(
        FraudAlert::new(&ctx.event.user_id, AlertType::RoboticTiming, SCORE, ctx.event.timestamp, ctx.location())
            .with_detail("timing_variance", variance)
            .with_detail("average_interval_ms", mean),
    )
}
