//! Batch job orchestration with throttle-aware retry and live progress.
//!
//! ## Design
//!
//! - A job is submitted, registered as `pending`, and runs in the background
//! - Items are split into fixed-size sub-batches processed one after another
//! - Within a sub-batch at most `concurrencyLimit` adapter calls are in flight
//! - Each call is wrapped in a backoff controller (linear on throttle, short
//!   fixed delay on other transient errors)
//! - Settlements stream to a single aggregator, which owns registry writes
//! - Item failures are recorded, never fatal; only catastrophic errors fail a job
//!
//! ## Components
//!
//! - `JobRegistry`: job records, polled by the API
//! - `WorkerPool`: rate-limited execution of one job's items
//! - `ResultAggregator`: folds settlements into the job record
//! - `Orchestrator`: submits jobs and supervises their runs
//! - `SyncAdapter`: contract every external use case implements

pub mod adapter;
pub mod aggregator;
pub mod backoff;
pub mod orchestrator;
pub mod partition;
pub mod pool;
pub mod registry;
pub mod types;

pub use adapter::{AdapterError, ItemOutcome, SyncAdapter};
pub use aggregator::ResultAggregator;
pub use backoff::{call_with_backoff, BackoffOutcome, RateLimitState, Retry};
pub use orchestrator::{JobHandle, Orchestrator};
pub use partition::{batch_count, partition};
pub use pool::{PoolOutcome, Settlement, WorkerPool};
pub use registry::{spawn_eviction_sweep, InMemoryJobRegistry, JobRegistry, SweepHandle, DEFAULT_RETENTION};
pub use types::{
    BatchConfig, ItemResult, Job, JobError, JobKind, JobStatus, JobSummary, JobUpdate, RetryPolicy,
};
