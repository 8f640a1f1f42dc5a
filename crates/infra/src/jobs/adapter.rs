//! Adapter contract between the orchestration core and external services.
//!
//! An adapter performs one external operation for one item and normalizes
//! the outcome. Expected per-item problems come back as [`AdapterError::Item`];
//! the core never sees raw transport errors.

use std::time::Duration;

use async_trait::async_trait;

use super::backoff::Retry;
use super::types::JobKind;

/// Successful result of processing one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub message: String,
    pub payload: serde_json::Value,
}

impl ItemOutcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Normalized adapter failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// The upstream explicitly asked us to slow down.
    #[error("rate limited by upstream")]
    Throttled { retry_after: Option<Duration> },

    /// A failure that may succeed on retry (5xx, timeouts, dropped connections).
    #[error("transient failure: {0}")]
    Transient(String),

    /// The item itself cannot be processed; retrying will not help.
    #[error("{0}")]
    Item(String),

    /// Shared infrastructure is unreachable; the whole job must stop.
    #[error("catastrophic failure: {0}")]
    Catastrophic(String),
}

impl AdapterError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn item(msg: impl Into<String>) -> Self {
        Self::Item(msg.into())
    }

    pub fn catastrophic(msg: impl Into<String>) -> Self {
        Self::Catastrophic(msg.into())
    }

    /// Retry classification used by the backoff controller.
    pub fn classify(&self) -> Retry {
        match self {
            AdapterError::Throttled { retry_after } => Retry::Throttle {
                retry_after: *retry_after,
            },
            AdapterError::Transient(_) => Retry::Transient,
            AdapterError::Item(_) => Retry::Permanent,
            AdapterError::Catastrophic(_) => Retry::Abort,
        }
    }
}

/// One external synchronization use case.
#[async_trait]
pub trait SyncAdapter: Send + Sync + 'static {
    type Item: Send + Sync + 'static;

    fn kind(&self) -> JobKind;

    /// Stable key used in results and error messages.
    fn item_key(&self, item: &Self::Item) -> String;

    /// Whether repeating `process` for the same item has the same effect as
    /// running it once. Non-idempotent adapters are only retried on throttle
    /// signals, which guarantee the request was not applied.
    fn idempotent(&self) -> bool {
        true
    }

    async fn process(&self, item: &Self::Item) -> Result<ItemOutcome, AdapterError>;
}
