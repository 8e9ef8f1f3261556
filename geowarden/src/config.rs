// geowarden/src/config.rs
//
// Command-line / environment configuration. Every flag can also be set via
// the environment variable named next to it; flags win over the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::consumer::source::StartPosition;
use crate::consumer::ConsumerConfig;
use crate::detectors::DetectionConfig;
use crate::engine::cooldown::CooldownConfig;
use crate::engine::dispatcher::ChannelSpec;
use crate::state::history::DEFAULT_HISTORY_SIZE;
use crate::state::redis_store::RedisConfig;

#[derive(Parser, Debug, Clone)]
#[command(
    name    = "geowarden",
    about   = "Real-time location fraud detection over partitioned event streams",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    // ── Stream ────────────────────────────────────────────────────────────
    #[arg(long, env = "STREAM_SOURCE", default_value = "/tmp/geowarden_stream",
          help = "Directory of <shard>.jsonl files")]
    pub source: PathBuf,

    #[arg(long, env = "STREAM_FOLLOW", help = "Tail shards forever instead of closing them at EOF")]
    pub follow: bool,

    #[arg(long, env = "STREAM_START_POSITION", value_enum, default_value = "trim-horizon")]
    pub start_position: StartPosition,

    #[arg(long, env = "STREAM_BATCH_LIMIT", default_value_t = 100)]
    pub batch_limit: usize,

    #[arg(long, env = "FETCH_RETRY_BACKOFF_SECS", default_value_t = 5)]
    pub retry_backoff_secs: u64,

    #[arg(long, env = "FETCH_POLL_INTERVAL_MS", default_value_t = 100)]
    pub poll_interval_ms: u64,

    // ── Outputs / shared state ────────────────────────────────────────────
    #[arg(long, env = "FRAUD_ALERT_CHANNEL",
          help = "file:<path> or redis:<channel>; alerts are only logged when unset")]
    pub alert_channel: Option<ChannelSpec>,

    #[arg(long, env = "REDIS_URL",
          help = "Shared counter/cooldown store; in-process stores when unset")]
    pub redis_url: Option<String>,

    #[arg(long, env = "REDIS_KEY_PREFIX", default_value = "gw:")]
    pub redis_key_prefix: String,

    // ── History ───────────────────────────────────────────────────────────
    #[arg(long, env = "HISTORY_SIZE", default_value_t = DEFAULT_HISTORY_SIZE)]
    pub history_size: usize,

    #[arg(long, env = "HISTORY_MAX_USERS", default_value_t = 0, help = "0 = unbounded")]
    pub max_users: usize,

    // ── Detection thresholds ──────────────────────────────────────────────
    #[arg(long, env = "MAX_SPEED_KMH", default_value_t = 50.0)]
    pub max_speed_kmh: f64,

    #[arg(long, env = "MIN_SPEED_GAP_SECS", default_value_t = 5.0)]
    pub min_speed_gap_secs: f64,

    #[arg(long, env = "TELEPORT_THRESHOLD_KM", default_value_t = 1.0)]
    pub teleport_km: f64,

    #[arg(long, env = "TELEPORT_TIME_SECONDS", default_value_t = 3.0)]
    pub teleport_secs: f64,

    #[arg(long, env = "MAX_LOCATIONS_PER_MINUTE", default_value_t = 20)]
    pub max_updates: u64,

    #[arg(long, env = "UPDATE_WINDOW_SECS", default_value_t = 60)]
    pub update_window_secs: u64,

    #[arg(long, env = "MIN_ACCURACY_METERS", default_value_t = 100.0)]
    pub max_accuracy_m: f64,

    // ── Cooldown ──────────────────────────────────────────────────────────
    #[arg(long, env = "ALERT_COOLDOWN_SECS", default_value_t = 300)]
    pub cooldown_secs: i64,

    #[arg(long, env = "ALERT_COOLDOWN_HIGH_RISK_SECS", default_value_t = 60)]
    pub high_risk_cooldown_secs: i64,

    #[arg(long, env = "HIGH_RISK_SCORE", default_value_t = 90)]
    pub high_risk_score: u8,

    // ── Operations ────────────────────────────────────────────────────────
    #[arg(long, env = "STATS_INTERVAL_SECS", default_value_t = 30)]
    pub stats_interval_secs: u64,
}

impl Cli {
    pub fn detection(&self) -> DetectionConfig {
        DetectionConfig {
            max_speed_kmh:      self.max_speed_kmh,
            min_speed_gap_secs: self.min_speed_gap_secs,
            teleport_km:        self.teleport_km,
            teleport_secs:      self.teleport_secs,
            max_updates:        self.max_updates,
            update_window_secs: self.update_window_secs,
            max_accuracy_m:     self.max_accuracy_m,
            ..DetectionConfig::default()
        }
    }

    pub fn cooldown(&self) -> CooldownConfig {
        CooldownConfig {
            cooldown:           chrono::Duration::seconds(self.cooldown_secs),
            high_risk_cooldown: chrono::Duration::seconds(self.high_risk_cooldown_secs),
            high_risk_score:    self.high_risk_score,
        }
    }

    pub fn consumer(&self) -> ConsumerConfig {
        ConsumerConfig {
            batch_limit:   self.batch_limit.max(1),
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn redis(&self) -> Option<RedisConfig> {
        self.redis_url.as_ref().map(|url| RedisConfig {
            url:        url.clone(),
            key_prefix: self.redis_key_prefix.clone(),
        })
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}
