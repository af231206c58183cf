//! Asynchronous dispatch of automated replies.
//!
//! The dispatcher owns the [`DispatchQueue`] and is the only consumer of it.
//! Ingestion submits tasks and returns immediately; a periodic [`tick`]
//! drains whatever is eligible, posts it, and records the outcome in the
//! ledger. Decoupling the two is what keeps webhook acknowledgment fast
//! regardless of platform API latency.
//!
//! # Failure handling
//!
//! Every poster failure is classified and absorbed here:
//!
//! - Retryable, attempts remaining: the task is re-enqueued with a backoff
//!   delay. The queue's time ordering means it cannot starve other tasks.
//! - Retryable, attempts exhausted: the ledger record finalizes `Failed`.
//! - Terminal: the record finalizes `Failed` immediately.
//!
//! A task failure never propagates out of the tick loop; there is no caller
//! waiting for it. The ledger and the structured logs are the audit trail.
//!
//! [`tick`]: Dispatcher::tick

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ledger::{DedupeLedger, LedgerError};
use crate::types::{ReplyId, ReplyStatus};

pub mod backoff;
pub mod poster;
pub mod queue;

pub use backoff::BackoffConfig;
pub use poster::{HttpPoster, PostReceipt, PosterError, PosterErrorKind, ReplyPoster};
pub use queue::{DispatchTask, DispatchQueue, QueueSaturatedError};

/// Configuration for the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Maximum queued tasks.
    pub queue_capacity: usize,

    /// Rate budget: maximum post attempts per tick. Together with the tick
    /// interval this bounds requests per time window.
    pub posts_per_tick: usize,

    /// Retry schedule.
    pub backoff: BackoffConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            queue_capacity: 256,
            posts_per_tick: 10,
            backoff: BackoffConfig::DEFAULT,
        }
    }
}

/// What one tick accomplished. Logged, and handy in tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Tasks posted successfully.
    pub posted: usize,

    /// Tasks re-enqueued for retry.
    pub retried: usize,

    /// Tasks finalized as failed.
    pub failed: usize,
}

impl TickSummary {
    fn is_empty(&self) -> bool {
        self.posted == 0 && self.retried == 0 && self.failed == 0
    }
}

/// The queue consumer: posts automated replies and records outcomes.
pub struct Dispatcher<P> {
    queue: Mutex<DispatchQueue>,
    ledger: Arc<DedupeLedger>,
    poster: P,
    config: DispatcherConfig,
}

impl<P: ReplyPoster> Dispatcher<P> {
    /// Creates a dispatcher over the given ledger and poster.
    pub fn new(ledger: Arc<DedupeLedger>, poster: P, config: DispatcherConfig) -> Self {
        Dispatcher {
            queue: Mutex::new(DispatchQueue::new(config.queue_capacity)),
            ledger,
            poster,
            config,
        }
    }

    /// Queues a rendered response for a reply.
    ///
    /// Fails fast with [`QueueSaturatedError`] at capacity; the caller is
    /// expected to finalize the ledger record as failed.
    pub async fn submit(
        &self,
        reply_id: ReplyId,
        rendered_response: String,
    ) -> Result<(), QueueSaturatedError> {
        let task = DispatchTask::new(reply_id, rendered_response, Utc::now());
        self.queue.lock().await.enqueue(task)
    }

    /// Number of currently queued tasks.
    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Processes eligible tasks, up to the per-tick post budget.
    ///
    /// This is the single entry point for the periodic consumption loop; an
    /// external scheduler (or [`run`](Dispatcher::run)) calls it on a fixed
    /// interval.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        for _ in 0..self.config.posts_per_tick {
            let task = {
                let mut queue = self.queue.lock().await;
                queue.dequeue_ready(Utc::now())
            };
            let Some(task) = task else { break };

            self.process(task, &mut summary).await;
        }

        if summary.is_empty() {
            let queue = self.queue.lock().await;
            if let Some(at) = queue.next_eligible_at() {
                debug!(queued = queue.len(), next_eligible = %at, "Nothing ready; tasks backing off");
            }
        } else {
            info!(
                posted = summary.posted,
                retried = summary.retried,
                failed = summary.failed,
                "Dispatch tick complete"
            );
        }
        summary
    }

    /// Posts one task and records its outcome. Never returns an error: all
    /// failures end in ledger state and logs.
    async fn process(&self, mut task: DispatchTask, summary: &mut TickSummary) {
        let reply_id = task.reply_id.clone();

        let attempt = match self.ledger.note_attempt(&reply_id).await {
            Ok(n) => n,
            Err(LedgerError::AlreadyFinal { status, .. }) => {
                // Finalized behind our back; the task is stale and dropped.
                warn!(reply_id = %reply_id, ?status, "Dropping task for finalized record");
                return;
            }
            Err(e) => {
                warn!(reply_id = %reply_id, error = %e, "Ledger unavailable; failing task");
                summary.failed += 1;
                return;
            }
        };
        task.attempt = attempt;

        match self.poster.post(&task).await {
            Ok(receipt) => {
                debug!(reply_id = %reply_id, posted_id = %receipt.id, attempt, "Reply posted");
                self.finalize(&reply_id, ReplyStatus::Processed, None).await;
                summary.posted += 1;
            }
            Err(e) if e.kind == PosterErrorKind::Retryable => {
                if self.config.backoff.attempts_exhausted(attempt) {
                    warn!(
                        reply_id = %reply_id,
                        attempt,
                        error = %e,
                        "Retry budget exhausted"
                    );
                    self.finalize(&reply_id, ReplyStatus::Failed, Some(e.to_string()))
                        .await;
                    summary.failed += 1;
                    return;
                }

                let delay = self.config.backoff.delay_after_attempt(attempt, &reply_id);
                task.next_eligible = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                debug!(
                    reply_id = %reply_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure; backing off"
                );

                match self.queue.lock().await.enqueue(task) {
                    Ok(()) => summary.retried += 1,
                    Err(saturated) => {
                        warn!(reply_id = %reply_id, error = %saturated, "No room to requeue");
                        self.finalize(&reply_id, ReplyStatus::Failed, Some(saturated.to_string()))
                            .await;
                        summary.failed += 1;
                    }
                }
            }
            Err(e) => {
                warn!(reply_id = %reply_id, attempt, error = %e, "Terminal posting failure");
                self.finalize(&reply_id, ReplyStatus::Failed, Some(e.to_string()))
                    .await;
                summary.failed += 1;
            }
        }
    }

    async fn finalize(&self, reply_id: &ReplyId, status: ReplyStatus, detail: Option<String>) {
        // The audit trail must survive failure paths, so a finalize error is
        // loud even though there is nobody to propagate it to.
        if let Err(e) = self.ledger.finalize(reply_id, status, detail).await {
            warn!(reply_id = %reply_id, error = %e, "Failed to finalize ledger record");
        }
    }

    /// Runs the periodic consumption loop until cancelled.
    ///
    /// Each iteration waits for the interval, then runs one tick. There is
    /// no indefinite wait: a tick processes what is eligible and returns.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_ms = interval.as_millis() as u64, "Dispatcher running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Dispatcher shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::JsonStore;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// A poster that replays a fixed script of results.
    struct ScriptedPoster {
        script: StdMutex<VecDeque<Result<PostReceipt, PosterError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedPoster {
        fn new(script: Vec<Result<PostReceipt, PosterError>>) -> Self {
            ScriptedPoster {
                script: StdMutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ReplyPoster for ScriptedPoster {
        async fn post(&self, _task: &DispatchTask) -> Result<PostReceipt, PosterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(receipt()))
        }
    }

    fn receipt() -> PostReceipt {
        PostReceipt {
            id: "posted-1".to_string(),
        }
    }

    fn rate_limited() -> PosterError {
        PosterError::from_status(429, "rate limited")
    }

    fn permission_denied() -> PosterError {
        PosterError::from_status(403, "permission denied")
    }

    /// Backoff with zero delays so retries become eligible immediately.
    fn immediate_backoff(max_attempts: u32) -> BackoffConfig {
        BackoffConfig {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 2.0,
            jitter_percent: 0,
        }
    }

    fn setup(
        script: Vec<Result<PostReceipt, PosterError>>,
        backoff: BackoffConfig,
    ) -> (Dispatcher<ScriptedPoster>, Arc<DedupeLedger>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        let ledger = Arc::new(DedupeLedger::new(store));
        let dispatcher = Dispatcher::new(
            ledger.clone(),
            ScriptedPoster::new(script),
            DispatcherConfig {
                queue_capacity: 16,
                posts_per_tick: 10,
                backoff,
            },
        );
        (dispatcher, ledger, dir)
    }

    async fn observed(ledger: &DedupeLedger, id: &str) -> ReplyId {
        let reply_id = ReplyId::new(id);
        ledger.observe(&reply_id, Utc::now()).await.unwrap();
        reply_id
    }

    #[tokio::test]
    async fn successful_post_finalizes_processed() {
        let (dispatcher, ledger, _dir) = setup(vec![Ok(receipt())], BackoffConfig::DEFAULT);
        let id = observed(&ledger, "r-1").await;

        dispatcher.submit(id.clone(), "hi!".to_string()).await.unwrap();
        let summary = dispatcher.tick().await;

        assert_eq!(summary, TickSummary { posted: 1, retried: 0, failed: 0 });

        let record = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::Processed);
        assert_eq!(record.attempt_count, 1);
        assert!(record.responded_at.is_some());
    }

    #[tokio::test]
    async fn rate_limits_then_success_retries_until_posted() {
        // Three 429s, then success: the record ends Processed at attempt 4.
        let (dispatcher, ledger, _dir) = setup(
            vec![
                Err(rate_limited()),
                Err(rate_limited()),
                Err(rate_limited()),
                Ok(receipt()),
            ],
            immediate_backoff(5),
        );
        let id = observed(&ledger, "r-1").await;

        dispatcher.submit(id.clone(), "hi!".to_string()).await.unwrap();
        let summary = dispatcher.tick().await;

        assert_eq!(summary, TickSummary { posted: 1, retried: 3, failed: 0 });

        let record = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::Processed);
        assert_eq!(record.attempt_count, 4);
    }

    #[tokio::test]
    async fn always_failing_task_stops_at_attempt_budget() {
        let always_rate_limited: Vec<Result<PostReceipt, PosterError>> =
            (0..20).map(|_| Err(rate_limited())).collect();
        let (dispatcher, ledger, _dir) = setup(always_rate_limited, immediate_backoff(5));
        let id = observed(&ledger, "r-1").await;

        dispatcher.submit(id.clone(), "hi!".to_string()).await.unwrap();
        let summary = dispatcher.tick().await;

        // Exactly 5 attempts: 4 retries then terminal failure.
        assert_eq!(summary, TickSummary { posted: 0, retried: 4, failed: 1 });
        assert_eq!(dispatcher.poster.calls(), 5);

        let record = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::Failed);
        assert_eq!(record.attempt_count, 5);

        // Nothing left queued; later ticks are no-ops.
        assert_eq!(dispatcher.queue_len().await, 0);
        assert_eq!(dispatcher.tick().await, TickSummary::default());
    }

    #[tokio::test]
    async fn terminal_error_fails_without_retry() {
        let (dispatcher, ledger, _dir) =
            setup(vec![Err(permission_denied())], immediate_backoff(5));
        let id = observed(&ledger, "r-1").await;

        dispatcher.submit(id.clone(), "hi!".to_string()).await.unwrap();
        let summary = dispatcher.tick().await;

        assert_eq!(summary, TickSummary { posted: 0, retried: 0, failed: 1 });
        assert_eq!(dispatcher.poster.calls(), 1);

        let record = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::Failed);
        assert_eq!(record.attempt_count, 1);
        assert!(record.detail.as_deref().unwrap().contains("403"));
    }

    #[tokio::test]
    async fn backoff_delay_defers_retry_to_later_tick() {
        let backoff = BackoffConfig {
            max_attempts: 5,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_percent: 0,
        };
        let (dispatcher, ledger, _dir) = setup(vec![Err(rate_limited())], backoff);
        let id = observed(&ledger, "r-1").await;

        dispatcher.submit(id.clone(), "hi!".to_string()).await.unwrap();
        let first = dispatcher.tick().await;
        assert_eq!(first, TickSummary { posted: 0, retried: 1, failed: 0 });

        // The retry is a minute out; an immediate tick must not touch it.
        let second = dispatcher.tick().await;
        assert_eq!(second, TickSummary::default());
        assert_eq!(dispatcher.queue_len().await, 1);

        let record = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::Pending);
        assert_eq!(record.attempt_count, 1);
    }

    #[tokio::test]
    async fn posts_per_tick_bounds_throughput() {
        let (dispatcher, ledger, _dir) = setup(Vec::new(), BackoffConfig::DEFAULT);
        let dispatcher = Dispatcher {
            config: DispatcherConfig {
                posts_per_tick: 2,
                ..dispatcher.config
            },
            ..dispatcher
        };

        for i in 0..5 {
            let id = observed(&ledger, &format!("r-{}", i)).await;
            dispatcher.submit(id, "hi!".to_string()).await.unwrap();
        }

        assert_eq!(dispatcher.tick().await.posted, 2);
        assert_eq!(dispatcher.tick().await.posted, 2);
        assert_eq!(dispatcher.tick().await.posted, 1);
    }

    #[tokio::test]
    async fn submit_fails_when_queue_full() {
        let (dispatcher, ledger, _dir) = setup(Vec::new(), BackoffConfig::DEFAULT);
        let dispatcher = Dispatcher {
            config: DispatcherConfig {
                queue_capacity: 2,
                ..dispatcher.config
            },
            queue: Mutex::new(DispatchQueue::new(2)),
            ..dispatcher
        };

        for i in 0..2 {
            let id = observed(&ledger, &format!("r-{}", i)).await;
            dispatcher.submit(id, "hi!".to_string()).await.unwrap();
        }

        let id = observed(&ledger, "r-overflow").await;
        let result = dispatcher.submit(id, "hi!".to_string()).await;
        assert_eq!(result, Err(QueueSaturatedError { capacity: 2 }));
    }

    #[tokio::test]
    async fn task_for_finalized_record_is_dropped() {
        let (dispatcher, ledger, _dir) = setup(vec![Ok(receipt())], BackoffConfig::DEFAULT);
        let id = observed(&ledger, "r-1").await;
        dispatcher.submit(id.clone(), "hi!".to_string()).await.unwrap();

        // Finalize out from under the queued task.
        ledger
            .finalize(&id, ReplyStatus::Failed, None)
            .await
            .unwrap();

        let summary = dispatcher.tick().await;
        assert_eq!(summary, TickSummary::default());
        assert_eq!(dispatcher.poster.calls(), 0);

        // The terminal record was not overwritten.
        let record = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::Failed);
    }

    #[tokio::test]
    async fn run_loop_processes_and_stops_on_cancel() {
        let (dispatcher, ledger, _dir) = setup(vec![Ok(receipt())], BackoffConfig::DEFAULT);
        let dispatcher = Arc::new(dispatcher);
        let id = observed(&ledger, "r-1").await;
        dispatcher.submit(id.clone(), "hi!".to_string()).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                dispatcher.run(Duration::from_millis(5), cancel).await;
            })
        };

        // Give the loop a few ticks to drain the queue.
        for _ in 0..100 {
            if dispatcher.queue_len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        cancel.cancel();
        handle.await.unwrap();

        let record = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ReplyStatus::Processed);
    }
}
