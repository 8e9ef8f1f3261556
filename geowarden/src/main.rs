// geowarden/src/main.rs
//
// Geowarden: real-time location fraud detection over partitioned streams.
//
// One worker per stream shard feeds every record through
//   decode → six heuristic detectors → cooldown gate → alert channel
// with per-user history in process and the rapid-update counter plus
// cooldown markers either in process or in Redis (shared between replicas).
//
// Usage:
//   geowarden --source /var/spool/locations --follow
//   geowarden --source ./replay --alert-channel file:/tmp/alerts.jsonl
//   REDIS_URL=redis://cache:6379 geowarden --follow --alert-channel redis:fraud-alerts

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod clock;
mod config;
mod consumer;
mod detectors;
mod engine;
mod error;
mod events;
mod geo;
mod pipeline;
mod state;

use clock::{Clock, SystemClock};
use config::Cli;
use consumer::source::FileStreamSource;
use consumer::{ConsumerStats, ShardConsumerPool};
use engine::cooldown::CooldownGate;
use engine::dispatcher::{AlertDispatcher, ChannelSpec, FileSink, NotificationSink, RedisSink};
use engine::fraud::FraudEngine;
use pipeline::{Pipeline, PipelineStats};
use state::cooldown::{CooldownStore, MemoryCooldownStore};
use state::counter::{CounterStore, MemoryCounterStore};
use state::history::HistoryStore;
use state::redis_store::RedisStore;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// In-process stores that need periodic sweeping. Absent with Redis, which
/// expires its own keys.
struct MemoryStores {
    counters:  Arc<MemoryCounterStore>,
    cooldowns: Arc<MemoryCooldownStore>,
}

// ── Background loops ──────────────────────────────────────────────────────────

async fn stats_loop(
    pipeline: Arc<PipelineStats>,
    consumer: Arc<ConsumerStats>,
    history:  Arc<HistoryStore>,
    every:    Duration,
    start:    Instant,
) {
    let mut tick = tokio::time::interval(every);
    tick.tick().await;
    loop {
        tick.tick().await;
        info!(
            uptime_s = start.elapsed().as_secs(),
            users    = history.n_users(),
            "stats {} | {}", pipeline.summary(), consumer.summary()
        );
    }
}

async fn housekeeping_loop(history: Arc<HistoryStore>, memory: Option<MemoryStores>, clock: Arc<dyn Clock>) {
    let mut tick = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    tick.tick().await;
    loop {
        tick.tick().await;
        let evicted = history.evict_lru();
        if evicted > 0 {
            info!(evicted, users = history.n_users(), "Evicted idle user histories");
        }
        if let Some(m) = &memory {
            let now     = clock.now();
            let buckets = m.counters.sweep(now);
            let markers = m.cooldowns.sweep(now);
            debug!(
                buckets, markers,
                counter_keys = m.counters.n_keys(),
                cooldowns    = m.cooldowns.n_active(),
                "Swept expired counter buckets and cooldown markers"
            );
        }
    }
}

async fn wait_for_ctrl_c(shutdown: watch::Sender<bool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown requested, finishing in-flight batches");
            let _ = shutdown.send(true);
        }
        Err(e) => {
            error!("Cannot listen for Ctrl-C, run until the stream closes: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("geowarden=info".parse()?))
        .compact().init();

    let cli   = Cli::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let start = Instant::now();

    // Shared state
    let history = Arc::new(HistoryStore::new(cli.history_size, cli.max_users));
    let redis = match cli.redis() {
        Some(cfg) => Some(RedisStore::connect(cfg).await.context("connecting to Redis")?),
        None      => None,
    };

    let (counters, cooldowns, memory) = match &redis {
        Some(store) => (
            Arc::new(store.clone()) as Arc<dyn CounterStore>,
            Arc::new(store.clone()) as Arc<dyn CooldownStore>,
            None,
        ),
        None => {
            let m = MemoryStores {
                counters:  Arc::new(MemoryCounterStore::new()),
                cooldowns: Arc::new(MemoryCooldownStore::new()),
            };
            (
                m.counters.clone() as Arc<dyn CounterStore>,
                m.cooldowns.clone() as Arc<dyn CooldownStore>,
                Some(m),
            )
        }
    };

    // Alert channel
    let sink: Option<Arc<dyn NotificationSink>> = match &cli.alert_channel {
        None => None,
        Some(ChannelSpec::File(path)) => Some(Arc::new(FileSink::new(path.clone()))),
        Some(ChannelSpec::Redis(channel)) => match &redis {
            Some(store) => Some(Arc::new(RedisSink::new(store.clone(), channel.clone()))),
            None        => bail!("alert channel redis:{} requires --redis-url", channel),
        },
    };

    // Pipeline
    let engine     = Arc::new(FraudEngine::new(Arc::clone(&history), counters, Arc::clone(&clock), cli.detection()));
    let gate       = Arc::new(CooldownGate::new(cooldowns, Arc::clone(&clock), cli.cooldown()));
    let dispatcher = Arc::new(AlertDispatcher::new(sink));
    let pipeline   = Arc::new(Pipeline::new(engine, gate, dispatcher));

    let source = Arc::new(FileStreamSource::new(&cli.source, cli.follow, cli.start_position));
    let pool   = ShardConsumerPool::new(source, pipeline.clone(), cli.consumer());

    info!(
        source  = %cli.source.display(),
        follow  = cli.follow,
        channel = %cli.alert_channel.as_ref().map(ToString::to_string).unwrap_or_else(|| "log".into()),
        state   = if redis.is_some() { "redis" } else { "memory" },
        "Geowarden starting"
    );

    tokio::spawn(stats_loop(pipeline.stats(), pool.stats(), Arc::clone(&history), cli.stats_interval(), start));
    tokio::spawn(housekeeping_loop(Arc::clone(&history), memory, Arc::clone(&clock)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_ctrl_c(shutdown_tx));

    pool.run(shutdown_rx).await;

    info!("Final {} | {}", pipeline.stats().summary(), pool.stats().summary());
    Ok(())
}
