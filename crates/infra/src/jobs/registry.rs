//! Job registry: the process-wide, in-memory home of job records.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use catalogsync_core::JobId;

use super::types::{ItemResult, Job, JobKind, JobUpdate};

/// Default time a terminal job stays readable before eviction.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Job registry abstraction.
///
/// Every mutator is atomic per job id. Mutating an unknown (or already
/// evicted) id is a logged no-op, never an error for the caller.
pub trait JobRegistry: Send + Sync {
    /// Allocate a pending job and return its id.
    fn create_job(&self, kind: JobKind, total_items: usize) -> JobId;

    /// Merge status/progress/message fields into a job.
    fn update_job(&self, job_id: JobId, update: JobUpdate);

    /// Count one settled item and append its result.
    fn increment_progress(&self, job_id: JobId, result: ItemResult);

    /// Append a job-level error without counting an item.
    fn add_error(&self, job_id: JobId, message: String);

    /// Snapshot of a job, or `None` if unknown/evicted.
    fn get_job(&self, job_id: JobId) -> Option<Job>;

    /// Snapshot of all retained jobs, newest first.
    fn list_jobs(&self) -> Vec<Job>;

    /// Drop terminal jobs whose retention window has passed. Returns the count removed.
    fn evict_expired(&self, now: DateTime<Utc>) -> usize;
}

/// In-memory job registry.
#[derive(Debug)]
pub struct InMemoryJobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
    retention: Duration,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    // A panic while holding the lock leaves at worst one half-merged record;
    // the map itself stays usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_job(&self, job_id: JobId, op: &'static str, f: impl FnOnce(&mut Job)) {
        let mut jobs = self.write();
        match jobs.get_mut(&job_id) {
            Some(job) => f(job),
            None => debug!(job_id = %job_id, op, "update for unknown or evicted job ignored"),
        }
    }
}

impl Default for InMemoryJobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry for InMemoryJobRegistry {
    fn create_job(&self, kind: JobKind, total_items: usize) -> JobId {
        let job = Job::new(kind, total_items);
        let id = job.id;
        self.write().insert(id, job);
        debug!(job_id = %id, kind = %kind, total_items, "job created");
        id
    }

    fn update_job(&self, job_id: JobId, update: JobUpdate) {
        self.with_job(job_id, "update_job", |job| {
            if let Err(e) = job.apply(update) {
                warn!(job_id = %job_id, error = %e, "job update rejected");
            }
        });
    }

    fn increment_progress(&self, job_id: JobId, result: ItemResult) {
        self.with_job(job_id, "increment_progress", |job| {
            if let Err(e) = job.record(result) {
                warn!(job_id = %job_id, error = %e, "progress update rejected");
            }
        });
    }

    fn add_error(&self, job_id: JobId, message: String) {
        self.with_job(job_id, "add_error", |job| job.push_error(message));
    }

    fn get_job(&self, job_id: JobId) -> Option<Job> {
        self.read().get(&job_id).cloned()
    }

    fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<_> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs
    }

    fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_expired(now, self.retention));
        before - jobs.len()
    }
}

/// Handle to the background eviction sweep. Dropping it stops the sweep.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Request shutdown and wait for the sweep task to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

/// Periodically evict expired jobs from `registry`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_eviction_sweep<R>(registry: Arc<R>, interval: Duration) -> SweepHandle
where
    R: JobRegistry + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let period = interval.max(Duration::from_millis(10));

    let join = tokio::spawn(async move {
        info!(interval_ms = period.as_millis() as u64, "job eviction sweep started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    let evicted = registry.evict_expired(Utc::now());
                    if evicted > 0 {
                        debug!(evicted, "evicted expired jobs");
                    }
                }
            }
        }

        info!("job eviction sweep stopped");
    });

    SweepHandle {
        shutdown: Some(shutdown_tx),
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobStatus;

    #[test]
    fn create_and_get() {
        let registry = InMemoryJobRegistry::new();
        let id = registry.create_job(JobKind::CatalogImport, 3);

        let job = registry.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_items, 3);
        assert_eq!(job.completed_items, 0);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let registry = InMemoryJobRegistry::new();
        assert!(registry.get_job(JobId::new()).is_none());
    }

    #[test]
    fn updates_to_unknown_jobs_are_noops() {
        let registry = InMemoryJobRegistry::new();
        let ghost = JobId::new();

        registry.update_job(ghost, JobUpdate::status(JobStatus::Running));
        registry.increment_progress(ghost, ItemResult::failure("a", "x", 1));
        registry.add_error(ghost, "late".to_string());

        assert!(registry.get_job(ghost).is_none());
        assert!(registry.list_jobs().is_empty());
    }

    #[test]
    fn increment_progress_recomputes_percent() {
        let registry = InMemoryJobRegistry::new();
        let id = registry.create_job(JobKind::InventoryRefresh, 3);
        registry.update_job(id, JobUpdate::status(JobStatus::Running));

        registry.increment_progress(id, ItemResult::success("a", "ok", serde_json::Value::Null, 1));
        assert_eq!(registry.get_job(id).unwrap().progress, 33);

        registry.increment_progress(id, ItemResult::failure("b", "bad", 1));
        let job = registry.get_job(id).unwrap();
        assert_eq!(job.progress, 66);
        assert_eq!(job.completed_items, 2);
        assert_eq!(job.errors, vec!["b: bad".to_string()]);
    }

    #[test]
    fn add_error_does_not_count_items() {
        let registry = InMemoryJobRegistry::new();
        let id = registry.create_job(JobKind::ImageRepublish, 2);
        registry.add_error(id, "datastore unreachable".to_string());

        let job = registry.get_job(id).unwrap();
        assert_eq!(job.completed_items, 0);
        assert_eq!(job.errors.len(), 1);
    }

    #[test]
    fn backward_transition_is_ignored() {
        let registry = InMemoryJobRegistry::new();
        let id = registry.create_job(JobKind::CatalogImport, 0);
        registry.update_job(id, JobUpdate::status(JobStatus::Completed));
        registry.update_job(id, JobUpdate::status(JobStatus::Running).with_message("oops"));

        let job = registry.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_ne!(job.current_message, "oops");
    }

    #[test]
    fn eviction_only_removes_expired_terminal_jobs() {
        let registry = InMemoryJobRegistry::with_retention(Duration::from_secs(60));
        let done = registry.create_job(JobKind::CatalogImport, 0);
        let running = registry.create_job(JobKind::CatalogImport, 1);
        registry.update_job(done, JobUpdate::status(JobStatus::Completed));
        registry.update_job(running, JobUpdate::status(JobStatus::Running));

        assert_eq!(registry.evict_expired(Utc::now()), 0);

        let later = Utc::now() + chrono::Duration::minutes(2);
        assert_eq!(registry.evict_expired(later), 1);
        assert!(registry.get_job(done).is_none());
        assert!(registry.get_job(running).is_some());
    }

    #[test]
    fn concurrent_increments_are_atomic() {
        let registry = Arc::new(InMemoryJobRegistry::new());
        let id = registry.create_job(JobKind::CatalogImport, 400);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        registry.increment_progress(
                            id,
                            ItemResult::success(format!("{t}-{i}"), "ok", serde_json::Value::Null, 1),
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let job = registry.get_job(id).unwrap();
        assert_eq!(job.completed_items, 400);
        assert_eq!(job.results.len(), 400);
        assert_eq!(job.progress, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_in_background() {
        let registry = Arc::new(InMemoryJobRegistry::with_retention(Duration::ZERO));
        let id = registry.create_job(JobKind::CatalogImport, 0);
        registry.update_job(id, JobUpdate::status(JobStatus::Completed));

        let sweep = spawn_eviction_sweep(registry.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        sweep.shutdown().await;

        assert!(registry.get_job(id).is_none());
    }
}
