// geowarden/src/pipeline.rs
//
// Per-record path:
//   decode ─► FraudEngine::analyze ─► CooldownGate ─► AlertDispatcher
//
// Every failure on this path is logged and the record skipped; nothing here
// can stop a shard worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::consumer::RecordHandler;
use crate::engine::{cooldown::CooldownGate, dispatcher::AlertDispatcher, fraud::FraudEngine};
use crate::events::LocationEvent;

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub records:           AtomicU64,
    pub events:            AtomicU64,
    pub ignored:           AtomicU64,
    pub decode_errors:     AtomicU64,
    pub alerts_raised:     AtomicU64,
    pub alerts_dispatched: AtomicU64,
    pub alerts_suppressed: AtomicU64,
    pub dispatch_failures: AtomicU64,
}

impl PipelineStats {
    pub fn summary(&self) -> String {
        let g = |c: &AtomicU64| c.load(Ordering::Relaxed);
        format!(
            "records={} events={} ignored={} decode_errors={} alerts={} dispatched={} suppressed={} dispatch_failures={}",
            g(&self.records), g(&self.events), g(&self.ignored), g(&self.decode_errors),
            g(&self.alerts_raised), g(&self.alerts_dispatched),
            g(&self.alerts_suppressed), g(&self.dispatch_failures),
        )
    }
}

pub struct Pipeline {
    engine:     Arc<FraudEngine>,
    gate:       Arc<CooldownGate>,
    dispatcher: Arc<AlertDispatcher>,
    stats:      Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(engine: Arc<FraudEngine>, gate: Arc<CooldownGate>, dispatcher: Arc<AlertDispatcher>) -> Self {
        Self { engine, gate, dispatcher, stats: Arc::new(PipelineStats::default()) }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub async fn process(&self, event: &LocationEvent) {
        self.stats.events.fetch_add(1, Ordering::Relaxed);
        let alerts = self.engine.analyze(event).await;

        for alert in alerts {
            self.stats.alerts_raised.fetch_add(1, Ordering::Relaxed);
            if !self.gate.should_dispatch(&alert).await {
                self.stats.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            match self.dispatcher.dispatch(&alert).await {
                Ok(_) => {
                    self.stats.alerts_dispatched.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                    error!(user_id = %alert.user_id, alert_type = %alert.alert_type, "Dispatch failed: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl RecordHandler for Pipeline {
    async fn handle(&self, shard: &str, record: &[u8]) {
        self.stats.records.fetch_add(1, Ordering::Relaxed);
        match LocationEvent::decode(record) {
            Ok(Some(event)) => self.process(&event).await,
            Ok(None) => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(shard, "Skipping non-location event");
            }
            Err(e) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(shard, "Malformed record skipped: {}", e);
            }
        }
    }
}
