//! Rate-limited worker pool.
//!
//! Runs an adapter per item with a hard cap on in-flight calls, one
//! sub-batch at a time. Every settlement is forwarded to the aggregator as
//! soon as it happens.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use catalogsync_core::JobId;

use super::adapter::{AdapterError, SyncAdapter};
use super::backoff::{call_with_backoff, RateLimitState, Retry};
use super::partition::{batch_count, partition};
use super::types::{BatchConfig, ItemResult, RetryPolicy};

/// Event emitted by a worker task when its item settles.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The item reached a terminal outcome (success or failure).
    Item(ItemResult),
    /// Shared infrastructure failed; the job must stop.
    Catastrophic { item_key: String, message: String },
}

/// How the pool stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOutcome {
    /// Every sub-batch ran to completion.
    Drained,
    /// A catastrophic error stopped the run.
    Aborted { message: String },
}

/// Worker pool configured for one job run.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: BatchConfig,
}

impl WorkerPool {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process `items` in sub-batches, sending each settlement on `events`.
    ///
    /// Sub-batch N+1 starts only after every task of sub-batch N settled and
    /// the cool-down elapsed. Dropping `events` at return tells the
    /// aggregator no more settlements will arrive.
    pub async fn run<A>(
        &self,
        job_id: JobId,
        adapter: Arc<A>,
        items: Vec<A::Item>,
        events: mpsc::Sender<Settlement>,
    ) -> PoolOutcome
    where
        A: SyncAdapter,
    {
        let limit = self.config.concurrency_limit.clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(limit));
        let policy = self.config.retry_policy();
        let call_timeout = self.config.call_timeout();
        let delay = self.config.batch_delay();
        let total_batches = batch_count(items.len(), self.config.batch_size);

        for (index, batch) in partition(items, self.config.batch_size).enumerate() {
            if index > 0 && !delay.is_zero() {
                debug!(job_id = %job_id, delay_ms = delay.as_millis() as u64, "cooling down between batches");
                tokio::time::sleep(delay).await;
            }
            debug!(job_id = %job_id, batch = index + 1, total_batches, size = batch.len(), "starting batch");

            let mut tasks = JoinSet::new();
            for item in batch {
                let key = adapter.item_key(&item);
                tasks.spawn(run_item(
                    job_id,
                    adapter.clone(),
                    item,
                    key,
                    policy.clone(),
                    call_timeout,
                    semaphore.clone(),
                ));
            }

            while let Some(joined) = tasks.join_next().await {
                let settlement = match joined {
                    Ok(settlement) => settlement,
                    // Cancelled by abort_all below; nothing to report.
                    Err(e) if e.is_cancelled() => continue,
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "worker task failed to join");
                        continue;
                    }
                };

                let abort = match &settlement {
                    Settlement::Catastrophic { item_key, message } => {
                        error!(job_id = %job_id, item_key = %item_key, error = %message, "catastrophic failure, stopping job");
                        Some(message.clone())
                    }
                    Settlement::Item(_) => None,
                };

                if events.send(settlement).await.is_err() {
                    tasks.abort_all();
                    return PoolOutcome::Aborted {
                        message: "progress channel closed".to_string(),
                    };
                }

                if let Some(message) = abort {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return PoolOutcome::Aborted { message };
                }
            }
        }

        info!(job_id = %job_id, total_batches, "all batches settled");
        PoolOutcome::Drained
    }
}

async fn run_item<A>(
    job_id: JobId,
    adapter: Arc<A>,
    item: A::Item,
    key: String,
    policy: RetryPolicy,
    call_timeout: Duration,
    semaphore: Arc<Semaphore>,
) -> Settlement
where
    A: SyncAdapter,
{
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return Settlement::Item(ItemResult::failure(key, "worker pool closed", 0));
        }
    };

    let idempotent = adapter.idempotent();
    let classify = move |e: &AdapterError| match e.classify() {
        // A transient failure may have been applied upstream.
        Retry::Transient if !idempotent => Retry::Permanent,
        other => other,
    };

    let mut state = RateLimitState::new();
    let mut started = 0u32;
    let attempt = AssertUnwindSafe(call_with_backoff(&policy, &mut state, classify, |attempt| {
        started = attempt;
        let adapter = adapter.clone();
        let item = &item;
        async move {
            debug!(job_id = %job_id, attempt, "adapter call");
            match tokio::time::timeout(call_timeout, adapter.process(item)).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::transient(format!(
                    "timed out after {}ms",
                    call_timeout.as_millis()
                ))),
            }
        }
    }))
    .catch_unwind()
    .await;

    let outcome = match attempt {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(job_id = %job_id, item_key = %key, attempts = started, "adapter panicked");
            return Settlement::Item(ItemResult::failure(key, "adapter panicked", started));
        }
    };

    match outcome.result {
        Ok(done) => Settlement::Item(ItemResult::success(key, done.message, done.payload, outcome.attempts)),
        Err(AdapterError::Catastrophic(message)) => Settlement::Catastrophic { item_key: key, message },
        Err(e) => {
            debug!(job_id = %job_id, item_key = %key, attempts = outcome.attempts, error = %e, "item failed");
            Settlement::Item(ItemResult::failure(key, e.to_string(), outcome.attempts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::adapter::ItemOutcome;
    use crate::jobs::types::JobKind;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Adapter whose per-item behaviour is scripted by failure counts.
    #[derive(Default)]
    struct Scripted {
        failures: Mutex<HashMap<String, (AdapterError, usize)>>,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        work: Duration,
    }

    impl Scripted {
        fn failing(self, key: &str, err: AdapterError, times: usize) -> Self {
            self.failures.lock().unwrap().insert(key.to_string(), (err, times));
            self
        }
    }

    #[async_trait]
    impl SyncAdapter for Scripted {
        type Item = String;

        fn kind(&self) -> JobKind {
            JobKind::CatalogImport
        }

        fn item_key(&self, item: &String) -> String {
            item.clone()
        }

        async fn process(&self, item: &String) -> Result<ItemOutcome, AdapterError> {
            self.calls.lock().unwrap().push(item.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if item == "panic" {
                panic!("adapter bug");
            }

            let mut failures = self.failures.lock().unwrap();
            if let Some((err, remaining)) = failures.get_mut(item) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(err.clone());
                }
            }
            Ok(ItemOutcome::new(format!("synced {item}")))
        }
    }

    fn items(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    async fn run(pool: WorkerPool, adapter: Arc<Scripted>, items: Vec<String>) -> (PoolOutcome, Vec<Settlement>) {
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = pool.run(JobId::new(), adapter, items, tx).await;
        let mut settled = Vec::new();
        while let Some(s) = rx.recv().await {
            settled.push(s);
        }
        (outcome, settled)
    }

    fn config() -> BatchConfig {
        BatchConfig::default()
            .with_batch_delay(Duration::ZERO)
            .with_base_backoff(Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_limit() {
        let adapter = Arc::new(Scripted {
            work: Duration::from_millis(50),
            ..Default::default()
        });
        let keys: Vec<String> = (0..12).map(|i| format!("item-{i}")).collect();
        let pool = WorkerPool::new(config().with_concurrency_limit(3).with_batch_size(6));

        let (outcome, settled) = run(pool, adapter.clone(), keys).await;

        assert_eq!(outcome, PoolOutcome::Drained);
        assert_eq!(settled.len(), 12);
        assert_eq!(adapter.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_item_does_not_block_siblings() {
        let adapter = Arc::new(Scripted::default().failing("b", AdapterError::item("bad sku"), usize::MAX));
        let pool = WorkerPool::new(config().with_concurrency_limit(2));

        let (outcome, settled) = run(pool, adapter, items(&["a", "b", "c"])).await;

        assert_eq!(outcome, PoolOutcome::Drained);
        let failures: Vec<_> = settled
            .iter()
            .filter_map(|s| match s {
                Settlement::Item(r) if !r.success => Some(r.item_key.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec!["b"]);
        assert_eq!(settled.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_throttle_becomes_item_failure() {
        let adapter = Arc::new(Scripted::default().failing(
            "a",
            AdapterError::Throttled { retry_after: None },
            usize::MAX,
        ));
        let pool = WorkerPool::new(config().with_max_retries(2));

        let (_, settled) = run(pool, adapter.clone(), items(&["a"])).await;

        match &settled[0] {
            Settlement::Item(r) => {
                assert!(!r.success);
                assert_eq!(r.attempts, 3);
            }
            other => panic!("unexpected settlement: {other:?}"),
        }
        assert_eq!(adapter.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_run_strictly_in_sequence() {
        let adapter = Arc::new(Scripted {
            work: Duration::from_millis(20),
            ..Default::default()
        });
        let pool = WorkerPool::new(
            config()
                .with_batch_size(2)
                .with_concurrency_limit(2)
                .with_batch_delay(Duration::from_millis(500)),
        );

        let started = tokio::time::Instant::now();
        let (outcome, settled) = run(pool, adapter.clone(), items(&["a", "b", "c", "d", "e"])).await;

        assert_eq!(outcome, PoolOutcome::Drained);
        assert_eq!(settled.len(), 5);
        // three batches of 20ms work plus two cool-downs
        assert!(started.elapsed() >= Duration::from_millis(1060));

        let calls = adapter.calls.lock().unwrap().clone();
        let pos = |k: &str| calls.iter().position(|c| c == k).unwrap();
        assert!(pos("a").max(pos("b")) < pos("c").min(pos("d")));
        assert!(pos("c").max(pos("d")) < pos("e"));
    }

    #[tokio::test(start_paused = true)]
    async fn catastrophic_error_stops_remaining_batches() {
        let adapter = Arc::new(
            Scripted::default().failing("b", AdapterError::catastrophic("datastore unreachable"), 1),
        );
        let pool = WorkerPool::new(config().with_batch_size(2).with_concurrency_limit(1));

        let (outcome, settled) = run(pool, adapter.clone(), items(&["a", "b", "c", "d"])).await;

        assert_eq!(
            outcome,
            PoolOutcome::Aborted {
                message: "datastore unreachable".to_string()
            }
        );
        assert!(settled.iter().any(|s| matches!(s, Settlement::Catastrophic { .. })));
        let calls = adapter.calls.lock().unwrap().clone();
        assert!(!calls.contains(&"c".to_string()));
        assert!(!calls.contains(&"d".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_adapter_becomes_failure_result() {
        let adapter = Arc::new(Scripted::default());
        let pool = WorkerPool::new(config());

        let (outcome, settled) = run(pool, adapter, items(&["ok", "panic"])).await;

        assert_eq!(outcome, PoolOutcome::Drained);
        assert_eq!(settled.len(), 2);
        assert!(settled.iter().any(|s| matches!(
            s,
            Settlement::Item(r)
                if r.item_key == "panic" && !r.success && r.message == "adapter panicked" && r.attempts == 1
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_and_retry() {
        let adapter = Arc::new(Scripted {
            work: Duration::from_secs(5),
            ..Default::default()
        });
        let pool = WorkerPool::new(
            config()
                .with_call_timeout(Duration::from_millis(100))
                .with_max_retries(1),
        );

        let (_, settled) = run(pool, adapter.clone(), items(&["slow"])).await;

        match &settled[0] {
            Settlement::Item(r) => {
                assert!(!r.success);
                assert_eq!(r.attempts, 2);
                assert!(r.message.contains("timed out"), "{}", r.message);
            }
            other => panic!("unexpected settlement: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_issues_no_calls() {
        let adapter = Arc::new(Scripted::default());
        let (outcome, settled) = run(WorkerPool::new(config()), adapter.clone(), Vec::new()).await;
        assert_eq!(outcome, PoolOutcome::Drained);
        assert!(settled.is_empty());
        assert!(adapter.calls.lock().unwrap().is_empty());
    }
}
