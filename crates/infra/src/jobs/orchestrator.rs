//! Job orchestrator: submits a run and drives it to a terminal state in the background.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use catalogsync_core::{DomainError, JobId};

use super::adapter::SyncAdapter;
use super::aggregator::ResultAggregator;
use super::partition::batch_count;
use super::pool::WorkerPool;
use super::registry::JobRegistry;
use super::types::{BatchConfig, Job, JobStatus, JobUpdate};

/// Bound on settlements buffered between the pool and the aggregator.
const MAX_PENDING_SETTLEMENTS: usize = 1024;

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    join: JoinHandle<()>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the background run to finish.
    ///
    /// Callers normally poll the registry instead; this is for tests and
    /// shutdown paths.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

/// Starts job runs against a shared registry.
///
/// Each run owns its own worker pool and aggregator; runs only share the
/// registry.
pub struct Orchestrator<R: JobRegistry> {
    registry: Arc<R>,
}

impl<R: JobRegistry> Clone for Orchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<R: JobRegistry + 'static> Orchestrator<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Poll a job by id.
    pub fn status(&self, job_id: JobId) -> Option<Job> {
        self.registry.get_job(job_id)
    }

    /// Register a job and start it in the background; returns immediately.
    ///
    /// The run is supervised by its own task, so a panic inside it marks the
    /// job `error` instead of reaching the caller.
    pub fn submit<A>(
        &self,
        adapter: Arc<A>,
        items: Vec<A::Item>,
        config: BatchConfig,
    ) -> Result<JobHandle, DomainError>
    where
        A: SyncAdapter,
    {
        config.validate()?;

        let kind = adapter.kind();
        let job_id = self.registry.create_job(kind, items.len());
        info!(job_id = %job_id, kind = %kind, total_items = items.len(), "job submitted");

        let registry = self.registry.clone();
        let span = tracing::info_span!("job", job_id = %job_id, kind = %kind);
        let join = tokio::spawn(
            async move {
                let run = tokio::spawn(run_job(registry.clone(), job_id, adapter, items, config).in_current_span());
                if let Err(e) = run.await {
                    error!(error = %e, "job runner crashed");
                    let message = "Job aborted: internal error while running job".to_string();
                    registry.add_error(job_id, message.clone());
                    registry.update_job(job_id, JobUpdate::status(JobStatus::Error).with_message(message));
                }
            }
            .instrument(span),
        );

        Ok(JobHandle { job_id, join })
    }
}

/// Drive one job from `pending` to a terminal status.
pub async fn run_job<R, A>(
    registry: Arc<R>,
    job_id: JobId,
    adapter: Arc<A>,
    items: Vec<A::Item>,
    config: BatchConfig,
) -> JobStatus
where
    R: JobRegistry + 'static,
    A: SyncAdapter,
{
    if items.is_empty() {
        registry.update_job(
            job_id,
            JobUpdate::status(JobStatus::Completed).with_message("No items to process"),
        );
        return JobStatus::Completed;
    }

    let batches = batch_count(items.len(), config.batch_size);
    registry.update_job(
        job_id,
        JobUpdate::status(JobStatus::Running)
            .with_message(format!("Processing {} items in {} batches", items.len(), batches)),
    );

    let (tx, rx) = mpsc::channel(config.batch_size.saturating_mul(2).clamp(1, MAX_PENDING_SETTLEMENTS));
    let aggregator = tokio::spawn(ResultAggregator::new(registry.clone(), job_id).consume(rx).in_current_span());

    let outcome = WorkerPool::new(config).run(job_id, adapter, items, tx).await;

    match aggregator.await {
        Ok(aggregator) => aggregator.finish(outcome),
        Err(e) => {
            error!(job_id = %job_id, error = %e, "result aggregator crashed");
            let message = "Job aborted: progress tracking failed".to_string();
            registry.add_error(job_id, message.clone());
            registry.update_job(job_id, JobUpdate::status(JobStatus::Error).with_message(message));
            JobStatus::Error
        }
    }
}
