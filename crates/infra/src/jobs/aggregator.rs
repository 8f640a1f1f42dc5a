//! Result aggregator: folds worker settlements into the job record.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use catalogsync_core::JobId;

use super::pool::{PoolOutcome, Settlement};
use super::registry::JobRegistry;
use super::types::{JobStatus, JobUpdate};

/// Consumes settlement events for one job and writes them to the registry.
///
/// Registry locking happens only here, so worker tasks never contend on it.
pub struct ResultAggregator<R: JobRegistry> {
    registry: Arc<R>,
    job_id: JobId,
    success_count: usize,
    error_count: usize,
    catastrophic: Option<String>,
}

impl<R: JobRegistry> ResultAggregator<R> {
    pub fn new(registry: Arc<R>, job_id: JobId) -> Self {
        Self {
            registry,
            job_id,
            success_count: 0,
            error_count: 0,
            catastrophic: None,
        }
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Apply one settlement.
    pub fn record(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Item(result) => {
                if result.success {
                    self.success_count += 1;
                } else {
                    self.error_count += 1;
                }
                self.registry.increment_progress(self.job_id, result);
            }
            Settlement::Catastrophic { item_key, message } => {
                warn!(job_id = %self.job_id, item_key = %item_key, error = %message, "catastrophic settlement");
                self.catastrophic.get_or_insert(message);
            }
        }
    }

    /// Drain `events` until every sender is gone.
    pub async fn consume(mut self, mut events: mpsc::Receiver<Settlement>) -> Self {
        while let Some(settlement) = events.recv().await {
            self.record(settlement);
        }
        self
    }

    /// Write the terminal status once the pool has stopped.
    ///
    /// Item failures alone never fail the job; only a catastrophic error does.
    pub fn finish(self, outcome: PoolOutcome) -> JobStatus {
        let failure = match outcome {
            PoolOutcome::Aborted { message } => Some(self.catastrophic.clone().unwrap_or(message)),
            PoolOutcome::Drained => self.catastrophic.clone(),
        };

        match failure {
            Some(message) => {
                let message = format!("Job aborted: {message}");
                self.registry.add_error(self.job_id, message.clone());
                self.registry
                    .update_job(self.job_id, JobUpdate::status(JobStatus::Error).with_message(message));
                warn!(job_id = %self.job_id, succeeded = self.success_count, failed = self.error_count, "job aborted");
                JobStatus::Error
            }
            None => {
                let message = format!(
                    "Completed: {} succeeded, {} failed",
                    self.success_count, self.error_count
                );
                self.registry
                    .update_job(self.job_id, JobUpdate::status(JobStatus::Completed).with_message(message));
                info!(job_id = %self.job_id, succeeded = self.success_count, failed = self.error_count, "job completed");
                JobStatus::Completed
            }
        }
    }
}
