// geowarden/src/consumer/mod.rs
//
// Shard consumer pool: one independent worker task per shard of a
// StreamSource. Workers never stop each other; a worker that panics is
// logged and the rest keep running. `run` returns when every worker has
// finished, either because its shard closed or because shutdown fired.

pub mod source;
pub mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use source::StreamSource;
use worker::{ShardWorker, WorkerState};

/// Receives every record of every shard, in shard order. Implementations
/// handle their own failures; a bad record must never stop the shard.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(&self, shard: &str, record: &[u8]);
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub batch_limit:   usize,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_limit:   100,
            retry_backoff: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub batches:       AtomicU64,
    pub records:       AtomicU64,
    pub fetch_retries: AtomicU64,
    pub shards_closed: AtomicU64,
}

impl ConsumerStats {
    pub fn summary(&self) -> String {
        format!(
            "records={} batches={} fetch_retries={} shards_closed={}",
            self.records.load(Ordering::Relaxed),
            self.batches.load(Ordering::Relaxed),
            self.fetch_retries.load(Ordering::Relaxed),
            self.shards_closed.load(Ordering::Relaxed),
        )
    }
}

pub struct ShardConsumerPool {
    source:  Arc<dyn StreamSource>,
    handler: Arc<dyn RecordHandler>,
    config:  ConsumerConfig,
    stats:   Arc<ConsumerStats>,
}

impl ShardConsumerPool {
    pub fn new(
        source:  Arc<dyn StreamSource>,
        handler: Arc<dyn RecordHandler>,
        config:  ConsumerConfig,
    ) -> Self {
        Self { source, handler, config, stats: Arc::new(ConsumerStats::default()) }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let shards = loop {
            if *shutdown.borrow() {
                return;
            }
            match self.source.shards().await {
                Ok(shards) => break shards,
                Err(e) => {
                    warn!("Shard listing failed, retrying in {:?}: {}", self.config.retry_backoff, e);
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_backoff) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        };

        if shards.is_empty() {
            warn!("Stream has no shards, nothing to consume");
            return;
        }
        info!("Starting {} shard worker(s)", shards.len());

        let mut workers = JoinSet::new();
        for shard in shards {
            let worker = ShardWorker::new(
                shard,
                Arc::clone(&self.source),
                Arc::clone(&self.handler),
                self.config.clone(),
                Arc::clone(&self.stats),
            );
            workers.spawn(worker.run(shutdown.clone()));
        }

        let mut closed = 0usize;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(WorkerState::Done) => closed += 1,
                Ok(_)                 => {}
                Err(e)                => error!("Shard worker failed: {}", e),
            }
        }
        info!(closed, "All shard workers finished");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use parking_lot::Mutex;

    use super::*;
    use crate::consumer::source::{Cursor, FetchBatch, ShardId};
    use crate::error::FetchError;

    struct ClosedShards {
        records: HashMap<String, Vec<Bytes>>,
    }

    #[async_trait]
    impl StreamSource for ClosedShards {
        async fn shards(&self) -> Result<Vec<ShardId>, FetchError> {
            Ok(self.records.keys().cloned().collect())
        }

        async fn initial_cursor(&self, _shard: &str) -> Result<Cursor, FetchError> {
            Ok(Cursor(0))
        }

        async fn fetch(&self, shard: &str, cursor: Cursor, limit: usize) -> Result<FetchBatch, FetchError> {
            let recs  = self.records.get(shard).ok_or_else(|| FetchError::ShardNotFound(shard.into()))?;
            let start = cursor.0 as usize;
            let end   = (start + limit).min(recs.len());
            let next  = (end < recs.len()).then_some(Cursor(end as u64));
            Ok(FetchBatch { records: recs[start..end].to_vec(), next })
        }
    }

    #[derive(Default)]
    struct PerShard {
        seen: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl RecordHandler for PerShard {
        async fn handle(&self, shard: &str, record: &[u8]) {
            self.seen.lock().entry(shard.to_string()).or_default().push(record.to_vec());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn every_shard_is_consumed_in_order() {
        let records = ["a", "b", "c"].iter()
            .map(|id| {
                let recs = (0..7).map(|i| Bytes::from(format!("{}", i))).collect();
                (id.to_string(), recs)
            })
            .collect();
        let handler = Arc::new(PerShard::default());
        let pool = ShardConsumerPool::new(
            Arc::new(ClosedShards { records }),
            handler.clone(),
            ConsumerConfig { batch_limit: 3, ..ConsumerConfig::default() },
        );
        let (_tx, rx) = watch::channel(false);
        pool.run(rx).await;

        let seen = handler.seen.lock();
        assert_eq!(seen.len(), 3);
        for recs in seen.values() {
            let order: Vec<String> = recs.iter().map(|r| String::from_utf8_lossy(r).into_owned()).collect();
            assert_eq!(order, vec!["0", "1", "2", "3", "4", "5", "6"]);
        }
        assert_eq!(pool.stats().shards_closed.load(Ordering::Relaxed), 3);
        assert_eq!(pool.stats().records.load(Ordering::Relaxed), 21);
    }
}
