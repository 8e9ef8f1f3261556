// geowarden/src/engine/dispatcher.rs
//
// Formats alerts into AlertNotification JSON and forwards them to the one
// configured notification channel:
//   file:<path>       append one JSON line per alert (tail it, ship it)
//   redis:<channel>   PUBLISH on a Redis pub/sub channel
// With no channel the alert is written to the log at WARN, never dropped
// silently. Errors are returned to the caller, which logs and moves on.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::events::{AlertNotification, FraudAlert};
use crate::state::redis_store::RedisStore;

// ── Channel spec ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSpec {
    File(PathBuf),
    Redis(String),
}

impl FromStr for ChannelSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("file", path)) if !path.is_empty()     => Ok(Self::File(PathBuf::from(path))),
            Some(("redis", channel)) if !channel.is_empty() => Ok(Self::Redis(channel.to_string())),
            _ => Err(format!("expected file:<path> or redis:<channel>, got '{}'", s)),
        }
    }
}

impl std::fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path)     => write!(f, "file:{}", path.display()),
            Self::Redis(channel) => write!(f, "redis:{}", channel),
        }
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, payload: &str) -> Result<(), DispatchError>;
}

pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NotificationSink for FileSink {
    async fn publish(&self, payload: &str) -> Result<(), DispatchError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut f = OpenOptions::new().create(true).append(true)
            .open(&self.path).await?;
        f.write_all(format!("{}\n", payload).as_bytes()).await?;
        Ok(())
    }
}

pub struct RedisSink {
    store:   RedisStore,
    channel: String,
}

impl RedisSink {
    pub fn new(store: RedisStore, channel: impl Into<String>) -> Self {
        Self { store, channel: channel.into() }
    }
}

#[async_trait]
impl NotificationSink for RedisSink {
    async fn publish(&self, payload: &str) -> Result<(), DispatchError> {
        self.store.publish(&self.channel, payload).await?;
        Ok(())
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

pub struct AlertDispatcher {
    sink: Option<Arc<dyn NotificationSink>>,
}

impl AlertDispatcher {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        if sink.is_none() {
            warn!("No alert channel configured, alerts will be logged instead");
        }
        Self { sink }
    }

    pub async fn dispatch(&self, alert: &FraudAlert) -> Result<AlertNotification, DispatchError> {
        let notification = AlertNotification::from_alert(alert);
        let payload      = serde_json::to_string(&notification)?;

        match &self.sink {
            Some(sink) => {
                sink.publish(&payload).await?;
                info!(
                    user_id = %notification.user_id,
                    severity = %notification.severity,
                    "{}", notification.subject()
                );
            }
            None => warn!(alert = %payload, "FRAUD ALERT"),
        }
        Ok(notification)
    }
}
