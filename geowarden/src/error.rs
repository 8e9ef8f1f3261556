// geowarden/src/error.rs
//
// Failure taxonomy for the detection pipeline.
//
//   DecodeError     malformed record, skipped individually
//   StoreError      shared counter / cooldown store unavailable (transient)
//   FetchError      stream fetch failed, worker goes to RETRY_WAIT
//   DispatchError   notification channel rejected the alert, alert dropped
//
// None of these terminate a worker. Only the shutdown signal does.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("record is not valid UTF-8 JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record has no event_type field")]
    MissingEventType,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shard '{0}' not found")]
    ShardNotFound(String),

    #[error("transient fetch failure: {0}")]
    Transient(String),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("publish failed: {0}")]
    Publish(#[from] StoreError),
}
