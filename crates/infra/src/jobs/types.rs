//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalogsync_core::{DomainError, JobId};

/// Which synchronization use case a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Pull products from the storefront into the catalog.
    CatalogImport,
    /// Refresh available quantities for catalog products.
    InventoryRefresh,
    /// Remove image backgrounds and republish them to the marketplace.
    ImageRepublish,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CatalogImport => "catalog_import",
            JobKind::InventoryRefresh => "inventory_refresh",
            JobKind::ImageRepublish => "image_republish",
        }
    }

    /// Parse the URL slug form (`catalog-import`, ...).
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "catalog-import" => Some(JobKind::CatalogImport),
            "inventory-refresh" => Some(JobKind::InventoryRefresh),
            "image-republish" => Some(JobKind::ImageRepublish),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
///
/// Transitions only move forward: `pending -> running -> {completed | error}`.
/// A job with nothing to do may go straight from `pending` to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Error => 2,
        }
    }

    /// Whether moving from `self` to `next` respects forward-only ordering.
    /// Re-asserting the current status is allowed (it merges nothing).
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Error raised when a job record rejects a mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("all {total} items already settled")]
    ProgressOverflow { total: usize },
}

/// Retry policy for a single adapter call chain.
///
/// Throttle waits grow linearly (`throttle_base * n` for the n-th consecutive
/// throttle); other transient errors wait a short fixed delay. Both draw from
/// the same `max_retries` budget. No single wait exceeds `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Base wait for throttle signals.
    pub throttle_base: Duration,
    /// Fixed wait for non-throttle transient errors.
    pub transient_delay: Duration,
    /// Ceiling for any single wait, including server-provided Retry-After.
    pub max_backoff: Duration,
}

/// Fixed wait between retries of non-throttle transient errors.
pub const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Upper bound for `concurrencyLimit`.
pub const MAX_CONCURRENCY_LIMIT: usize = 256;

/// Upper bound for `batchSize`.
pub const MAX_BATCH_SIZE: usize = 10_000;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            throttle_base: Duration::from_millis(1000),
            transient_delay: TRANSIENT_RETRY_DELAY,
            max_backoff: Duration::from_millis(default_max_backoff_ms()),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Wait before retrying after the `consecutive`-th throttle in a row (1-indexed).
    pub fn throttle_delay(&self, consecutive: u32) -> Duration {
        self.throttle_base.saturating_mul(consecutive.max(1)).min(self.max_backoff)
    }

    /// Check if another attempt is allowed after `retries_used` retries.
    pub fn should_retry(&self, retries_used: u32) -> bool {
        retries_used < self.max_retries
    }
}

fn default_concurrency_limit() -> usize {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

/// Per-job tuning, fixed for the lifetime of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchConfig {
    /// Maximum adapter calls in flight at once.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Items per sub-batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Base wait for linear throttle backoff.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Retries allowed per item after its first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Cool-down between sub-batches.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Upper bound for a single adapter attempt.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Ceiling for a single retry wait; longer Retry-After hints are clamped.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            batch_size: default_batch_size(),
            base_backoff_ms: default_base_backoff_ms(),
            max_retries: default_max_retries(),
            batch_delay_ms: default_batch_delay_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&self.concurrency_limit) {
            return Err(DomainError::validation(format!(
                "concurrencyLimit must be between 1 and {MAX_CONCURRENCY_LIMIT}"
            )));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(DomainError::validation(format!(
                "batchSize must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if self.call_timeout_ms == 0 {
            return Err(DomainError::validation("callTimeoutMs must be at least 1"));
        }
        if self.max_backoff_ms == 0 {
            return Err(DomainError::validation("maxBackoffMs must be at least 1"));
        }
        Ok(())
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_backoff(mut self, base: Duration) -> Self {
        self.base_backoff_ms = base.as_millis() as u64;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            throttle_base: Duration::from_millis(self.base_backoff_ms),
            transient_delay: TRANSIENT_RETRY_DELAY.min(Duration::from_millis(self.max_backoff_ms)),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Outcome of one processed item. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub item_key: String,
    pub success: bool,
    pub message: String,
    pub payload: serde_json::Value,
    /// Adapter attempts spent on this item (0 if it never ran).
    pub attempts: u32,
}

impl ItemResult {
    pub fn success(
        item_key: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
        attempts: u32,
    ) -> Self {
        Self {
            item_key: item_key.into(),
            success: true,
            message: message.into(),
            payload,
            attempts,
        }
    }

    pub fn failure(item_key: impl Into<String>, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            item_key: item_key.into(),
            success: false,
            message: message.into(),
            payload: serde_json::Value::Null,
            attempts,
        }
    }
}

/// Partial update merged into a job record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Success/failure roll-up surfaced once a job settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub success_count: usize,
    pub error_count: usize,
    pub first_errors: Vec<String>,
}

/// A batch synchronization run, tracked from submission to terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub total_items: usize,
    pub completed_items: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// `floor(completed / total * 100)`; 100 once a job completes.
    pub progress: u8,
    pub current_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<ItemResult>,
    pub errors: Vec<String>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(kind: JobKind, total_items: usize) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Pending,
            total_items,
            completed_items: 0,
            success_count: 0,
            error_count: 0,
            progress: 0,
            current_message: "Queued".to_string(),
            created_at: now,
            updated_at: now,
            finished_at: None,
            results: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Merge a partial update. Backward status moves are rejected and leave
    /// the record untouched.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), JobError> {
        let now = Utc::now();
        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(JobError::InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
            if next != self.status {
                self.status = next;
                if next.is_terminal() {
                    self.finished_at = Some(now);
                    if next == JobStatus::Completed {
                        self.progress = 100;
                    }
                }
            }
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = update.message {
            self.current_message = message;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Record one settled item.
    pub fn record(&mut self, result: ItemResult) -> Result<(), JobError> {
        if self.completed_items >= self.total_items {
            return Err(JobError::ProgressOverflow {
                total: self.total_items,
            });
        }

        self.completed_items += 1;
        if result.success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
            self.errors.push(format!("{}: {}", result.item_key, result.message));
        }
        self.progress = percent(self.completed_items, self.total_items);
        self.current_message = format!(
            "{} ({}/{}): {}",
            result.item_key, self.completed_items, self.total_items, result.message
        );
        self.updated_at = Utc::now();
        self.results.push(result);
        Ok(())
    }

    /// Append a job-level error without counting an item.
    pub fn push_error(&mut self, message: String) {
        self.errors.push(message);
        self.updated_at = Utc::now();
    }

    /// Roll-up with at most `max_errors` error messages.
    pub fn summary(&self, max_errors: usize) -> JobSummary {
        JobSummary {
            success_count: self.success_count,
            error_count: self.error_count,
            first_errors: self.errors.iter().take(max_errors).cloned().collect(),
        }
    }

    /// Whether a terminal job has outlived its retention window.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        let Some(finished_at) = self.finished_at else {
            return false;
        };
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        finished_at
            .checked_add_signed(retention)
            .is_some_and(|deadline| deadline <= now)
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed.saturating_mul(100)) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_throttle_delay() {
        let policy = RetryPolicy {
            max_retries: 3,
            throttle_base: Duration::from_millis(100),
            transient_delay: Duration::from_millis(10),
            max_backoff: Duration::from_millis(250),
        };

        assert_eq!(policy.throttle_delay(1), Duration::from_millis(100));
        assert_eq!(policy.throttle_delay(2), Duration::from_millis(200));
        assert_eq!(policy.throttle_delay(3), Duration::from_millis(250));
        assert_eq!(policy.throttle_delay(u32::MAX), Duration::from_millis(250));
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }

    #[test]
    fn status_moves_forward_only() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Completed));
        assert!(Running.can_transition_to(Error));
        assert!(Running.can_transition_to(Running));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Running));
    }

    #[test]
    fn job_lifecycle() {
        let mut job = Job::new(JobKind::CatalogImport, 2);
        assert_eq!(job.status, JobStatus::Pending);

        job.apply(JobUpdate::status(JobStatus::Running)).unwrap();
        job.record(ItemResult::success("a", "ok", serde_json::Value::Null, 1))
            .unwrap();
        assert_eq!(job.progress, 50);

        job.record(ItemResult::failure("b", "boom", 4)).unwrap();
        assert_eq!(job.completed_items, 2);
        assert_eq!(job.error_count, 1);
        assert_eq!(job.errors, vec!["b: boom".to_string()]);

        job.apply(JobUpdate::status(JobStatus::Completed)).unwrap();
        assert!(job.finished_at.is_some());
        assert_eq!(job.progress, 100);

        let err = job.apply(JobUpdate::status(JobStatus::Running)).unwrap_err();
        assert_eq!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Completed,
                to: JobStatus::Running
            }
        );
    }

    #[test]
    fn record_never_exceeds_total() {
        let mut job = Job::new(JobKind::InventoryRefresh, 1);
        job.record(ItemResult::failure("a", "x", 1)).unwrap();
        let err = job.record(ItemResult::failure("b", "y", 1)).unwrap_err();
        assert_eq!(err, JobError::ProgressOverflow { total: 1 });
        assert_eq!(job.completed_items, 1);
    }

    #[test]
    fn progress_is_floored() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 0);
    }

    #[test]
    fn summary_caps_error_list() {
        let mut job = Job::new(JobKind::ImageRepublish, 4);
        for key in ["a", "b", "c", "d"] {
            job.record(ItemResult::failure(key, "nope", 1)).unwrap();
        }
        let summary = job.summary(2);
        assert_eq!(summary.error_count, 4);
        assert_eq!(summary.first_errors, vec!["a: nope", "b: nope"]);
    }

    #[test]
    fn only_terminal_jobs_expire() {
        let mut job = Job::new(JobKind::CatalogImport, 0);
        let later = Utc::now() + chrono::Duration::hours(1);
        assert!(!job.is_expired(later, Duration::from_secs(60)));

        job.apply(JobUpdate::status(JobStatus::Completed)).unwrap();
        assert!(job.is_expired(later, Duration::from_secs(60)));
        assert!(!job.is_expired(Utc::now(), Duration::from_secs(600)));
    }

    #[test]
    fn batch_config_rejects_unknown_options() {
        let err = serde_json::from_value::<BatchConfig>(serde_json::json!({
            "concurrencyLimit": 2,
            "turbo": true
        }));
        assert!(err.is_err());

        let cfg: BatchConfig = serde_json::from_value(serde_json::json!({
            "concurrencyLimit": 2,
            "batchDelayMs": 0
        }))
        .unwrap();
        assert_eq!(cfg.concurrency_limit, 2);
        assert_eq!(cfg.batch_delay(), Duration::ZERO);
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn batch_config_validation() {
        assert!(BatchConfig::default().validate().is_ok());
        assert!(BatchConfig::default().with_concurrency_limit(0).validate().is_err());
        assert!(BatchConfig::default().with_batch_size(0).validate().is_err());
        assert!(BatchConfig::default().with_max_backoff(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn batch_config_rejects_oversized_limits() {
        let ok = BatchConfig::default()
            .with_concurrency_limit(MAX_CONCURRENCY_LIMIT)
            .with_batch_size(MAX_BATCH_SIZE);
        assert!(ok.validate().is_ok());

        for cfg in [
            BatchConfig::default().with_concurrency_limit(MAX_CONCURRENCY_LIMIT + 1),
            BatchConfig::default().with_concurrency_limit(usize::MAX),
            BatchConfig::default().with_batch_size(MAX_BATCH_SIZE + 1),
            BatchConfig::default().with_batch_size(usize::MAX / 2),
        ] {
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{err:?}");
        }
    }

    #[test]
    fn retry_policy_carries_backoff_ceiling() {
        let policy = BatchConfig::default()
            .with_max_backoff(Duration::from_millis(100))
            .retry_policy();
        assert_eq!(policy.max_backoff, Duration::from_millis(100));
        assert_eq!(policy.transient_delay, Duration::from_millis(100));
        assert_eq!(policy.throttle_delay(1), Duration::from_millis(100));

        let cfg: BatchConfig = serde_json::from_value(serde_json::json!({ "maxBackoffMs": 5000 })).unwrap();
        assert_eq!(cfg.retry_policy().max_backoff, Duration::from_secs(5));
        assert_eq!(BatchConfig::default().max_backoff_ms, 60_000);
    }

    #[test]
    fn kind_slugs() {
        assert_eq!(JobKind::from_slug("catalog-import"), Some(JobKind::CatalogImport));
        assert_eq!(JobKind::from_slug("image-republish"), Some(JobKind::ImageRepublish));
        assert_eq!(JobKind::from_slug("nope"), None);
    }
}
