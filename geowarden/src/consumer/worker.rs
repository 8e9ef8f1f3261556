// geowarden/src/consumer/worker.rs
//
// One worker per shard, driven as an explicit state machine:
//
//   INIT ──► FETCH ──► PROCESS ──► ADVANCE ──► FETCH ...
//    │         │                      │
//    │         └──► RETRY_WAIT ──► FETCH (same cursor)
//    └──► RETRY_WAIT ──► INIT
//                                     └──► DONE (no next cursor)
//
// Records of a batch are handed to the RecordHandler strictly in order.
// Shutdown is observed only between transitions and never while a fetched
// batch is pending, so every fetched batch is processed before the worker
// exits. Waits (retry backoff, idle poll) are interruptible by shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::source::{Cursor, ShardId, StreamSource};
use super::{ConsumerConfig, ConsumerStats, RecordHandler};

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerState {
    Init,
    Fetch(Cursor),
    Process { records: Vec<Bytes>, next: Option<Cursor> },
    Advance(Option<Cursor>),
    /// `resume = None` means the initial cursor itself must be re-requested.
    RetryWait { resume: Option<Cursor> },
    Done,
}

pub struct ShardWorker {
    shard:   ShardId,
    source:  Arc<dyn StreamSource>,
    handler: Arc<dyn RecordHandler>,
    config:  ConsumerConfig,
    stats:   Arc<ConsumerStats>,
}

impl ShardWorker {
    pub fn new(
        shard:   ShardId,
        source:  Arc<dyn StreamSource>,
        handler: Arc<dyn RecordHandler>,
        config:  ConsumerConfig,
        stats:   Arc<ConsumerStats>,
    ) -> Self {
        Self { shard, source, handler, config, stats }
    }

    /// Perform one transition. Never sleeps; delays belong to `run`.
    pub async fn step(&self, state: WorkerState) -> WorkerState {
        match state {
            WorkerState::Init => match self.source.initial_cursor(&self.shard).await {
                Ok(cursor) => {
                    debug!(shard = %self.shard, %cursor, "Starting shard");
                    WorkerState::Fetch(cursor)
                }
                Err(e) => {
                    warn!(shard = %self.shard, "Initial cursor request failed: {}", e);
                    self.stats.fetch_retries.fetch_add(1, Ordering::Relaxed);
                    WorkerState::RetryWait { resume: None }
                }
            },

            WorkerState::Fetch(cursor) => {
                match self.source.fetch(&self.shard, cursor, self.config.batch_limit).await {
                    Ok(batch) => WorkerState::Process { records: batch.records, next: batch.next },
                    Err(e) => {
                        warn!(shard = %self.shard, %cursor, "Fetch failed, retrying in {:?}: {}",
                              self.config.retry_backoff, e);
                        self.stats.fetch_retries.fetch_add(1, Ordering::Relaxed);
                        WorkerState::RetryWait { resume: Some(cursor) }
                    }
                }
            }

            WorkerState::Process { records, next } => {
                if !records.is_empty() {
                    for record in &records {
                        self.handler.handle(&self.shard, record).await;
                    }
                    self.stats.batches.fetch_add(1, Ordering::Relaxed);
                    self.stats.records.fetch_add(records.len() as u64, Ordering::Relaxed);
                    debug!(shard = %self.shard, "Processed {} records", records.len());
                }
                WorkerState::Advance(next)
            }

            WorkerState::Advance(Some(cursor)) => WorkerState::Fetch(cursor),

            WorkerState::Advance(None) => {
                info!(shard = %self.shard, "Shard closed");
                self.stats.shards_closed.fetch_add(1, Ordering::Relaxed);
                WorkerState::Done
            }

            WorkerState::RetryWait { resume: Some(cursor) } => WorkerState::Fetch(cursor),
            WorkerState::RetryWait { resume: None }         => WorkerState::Init,

            WorkerState::Done => WorkerState::Done,
        }
    }

    fn delay_before(&self, state: &WorkerState) -> Option<std::time::Duration> {
        match state {
            WorkerState::RetryWait { .. } => Some(self.config.retry_backoff),
            WorkerState::Advance(Some(_)) if !self.config.poll_interval.is_zero() => {
                Some(self.config.poll_interval)
            }
            _ => None,
        }
    }

    /// Drive the shard until it closes or shutdown is signalled. Returns the
    /// state the worker stopped in.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> WorkerState {
        let mut state = WorkerState::Init;
        loop {
            // a fetched batch is always processed before stopping
            let holding_batch = matches!(state, WorkerState::Process { .. });
            if !holding_batch && *shutdown.borrow() {
                info!(shard = %self.shard, "Shard worker stopping");
                return state;
            }

            if let Some(delay) = self.delay_before(&state) {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            return state;
                        }
                        continue;
                    }
                }
            }

            state = self.step(state).await;
            if state == WorkerState::Done {
                return state;
            }
        }
    }
}
