//! Consumer loop: dequeue, run the handler, report back.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use indexq_core::{ChangeJob, HandlerError, JobId};

use super::config::QueueConfig;
use super::engine::{FailOutcome, QueueEngine};
use super::error::QueueError;
use crate::list_store::ListStore;

/// Job handler (e.g. the search-index client).
///
/// Must be safe to call more than once for the same job: delivery is
/// at-least-once.
pub type JobHandler = Arc<dyn Fn(&ChangeJob) -> Result<(), HandlerError> + Send + Sync>;

/// Consumer loop configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Name for logging and the worker thread
    pub name: String,
    /// Bounded wait of each dequeue
    pub poll_timeout: Duration,
    /// Pause after an engine error
    pub error_backoff: Duration,
    /// Failed attempts allowed before dead-lettering
    pub max_retries: u32,
    /// Optional handler deadline
    pub job_timeout: Option<Duration>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for ConsumerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            name: config.consumer_name.clone(),
            poll_timeout: config.poll_timeout,
            error_backoff: config.error_backoff,
            max_retries: config.max_retries,
            job_timeout: config.job_timeout,
        }
    }
}

/// What one iteration of the loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing arrived within the poll timeout.
    Idle,
    Completed(JobId),
    Requeued { job_id: JobId, retry_count: u32 },
    DeadLettered(JobId),
    /// The job left processing before the result could be recorded.
    Lost(JobId),
}

/// Runtime counters of a consumer loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConsumerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub jobs_lost: u64,
    pub loop_errors: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::Idle => return,
            PollOutcome::Completed(_) => self.jobs_succeeded += 1,
            PollOutcome::Requeued { .. } => self.jobs_retried += 1,
            PollOutcome::DeadLettered(_) => self.jobs_dead_lettered += 1,
            PollOutcome::Lost(_) => self.jobs_lost += 1,
        }
        self.jobs_processed += 1;
    }
}

/// Handle to control a running consumer.
///
/// Dropping the handle also stops the loop (at its next iteration).
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl ConsumerHandle {
    /// Request shutdown and wait for the loop to stop.
    ///
    /// Returns once the in-flight dequeue or job finishes.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Current consumer statistics.
    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }
}

/// Single sequential consumer over a queue engine.
///
/// One job is in flight at a time. Several consumers may share the same
/// engine or lists; the store's atomic move guarantees no two receive the
/// same pending record.
pub struct ConsumerLoop<S: ListStore> {
    engine: Arc<QueueEngine<S>>,
    handler: JobHandler,
    config: ConsumerConfig,
}

impl<S: ListStore + 'static> ConsumerLoop<S> {
    pub fn new<F>(engine: Arc<QueueEngine<S>>, config: ConsumerConfig, handler: F) -> Self
    where
        F: Fn(&ChangeJob) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            engine,
            handler: Arc::new(handler),
            config,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Put jobs orphaned in processing by a previous run back on pending.
    ///
    /// Call once before [`ConsumerLoop::spawn`], while no consumer of this
    /// queue is running; recovered jobs keep their retry counts.
    pub fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let recovered = self.engine.requeue_processing()?;
        if recovered > 0 {
            warn!(consumer = %self.config.name, recovered, "recovered jobs left in processing");
        }
        Ok(recovered)
    }

    /// Run one dequeue → handle → report cycle.
    pub fn poll_once(&self) -> Result<PollOutcome, QueueError> {
        let Some(job) = self.engine.dequeue(self.config.poll_timeout)? else {
            return Ok(PollOutcome::Idle);
        };

        debug!(consumer = %self.config.name, job_id = %job.id, table = %job.table, "handling job");

        let outcome = match self.run_handler(&job) {
            Ok(()) => {
                if self.engine.complete(&job.id)? {
                    PollOutcome::Completed(job.id)
                } else {
                    PollOutcome::Lost(job.id)
                }
            }
            Err(err) => {
                match self
                    .engine
                    .fail(&job.id, err.message(), self.config.max_retries)?
                {
                    FailOutcome::Requeued { retry_count } => PollOutcome::Requeued {
                        job_id: job.id,
                        retry_count,
                    },
                    FailOutcome::DeadLettered => PollOutcome::DeadLettered(job.id),
                    FailOutcome::NotInProcessing => PollOutcome::Lost(job.id),
                }
            }
        };

        Ok(outcome)
    }

    fn run_handler(&self, job: &ChangeJob) -> Result<(), HandlerError> {
        let Some(limit) = self.config.job_timeout else {
            return panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(job)))
                .unwrap_or_else(|_| Err(HandlerError::new("handler panicked")));
        };

        // The helper thread is abandoned on timeout; its late result is dropped.
        let (tx, rx) = mpsc::channel();
        let handler = Arc::clone(&self.handler);
        let owned = job.clone();
        thread::Builder::new()
            .name(format!("{}-job", self.config.name))
            .spawn(move || {
                let _ = tx.send(handler(&owned));
            })
            .map_err(|e| HandlerError::new(format!("failed to start handler thread: {e}")))?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(consumer = %self.config.name, job_id = %job.id, timeout = ?limit, "handler timed out");
                Err(HandlerError::new(format!("handler timed out after {limit:?}")))
            }
            Err(RecvTimeoutError::Disconnected) => Err(HandlerError::new("handler panicked")),
        }
    }

    /// Spawn the loop on a dedicated thread.
    pub fn spawn(self) -> std::io::Result<ConsumerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ConsumerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || consumer_loop(self, shutdown_rx, stats_clone))?;

        Ok(ConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn consumer_loop<S: ListStore + 'static>(
    consumer: ConsumerLoop<S>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ConsumerStats>>,
) {
    let name = consumer.config.name.clone();
    info!(
        consumer = %name,
        queue = %consumer.engine.names().name(),
        max_retries = consumer.config.max_retries,
        "consumer loop started"
    );

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match consumer.poll_once() {
            Ok(outcome) => {
                stats
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(&outcome);
            }
            Err(e) => {
                stats.lock().unwrap_or_else(PoisonError::into_inner).loop_errors += 1;
                error!(consumer = %name, error = %e, backoff = ?consumer.config.error_backoff, "consumer iteration failed");

                // Back off, but wake immediately on shutdown.
                match shutdown_rx.recv_timeout(consumer.config.error_backoff) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        }
    }

    info!(consumer = %name, "consumer loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use indexq_core::{Operation, QueueKind};
    use serde_json::json;

    use crate::list_store::{InMemoryListStore, ListStoreError};

    fn engine() -> Arc<QueueEngine<InMemoryListStore>> {
        Arc::new(QueueEngine::new(InMemoryListStore::new(), "test"))
    }

    fn fast_config() -> ConsumerConfig {
        ConsumerConfig {
            name: "test-consumer".to_string(),
            poll_timeout: Duration::from_millis(20),
            error_backoff: Duration::from_millis(10),
            max_retries: 2,
            job_timeout: None,
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met within timeout");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn poll_once_completes_successful_job() {
        let engine = engine();
        let id = engine.enqueue("listings", Operation::Insert, json!({})).unwrap();
        let consumer = ConsumerLoop::new(engine.clone(), fast_config(), |_job| Ok(()));

        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Completed(id));
        assert_eq!(engine.get_stats().unwrap().completed, 1);
    }

    #[test]
    fn poll_once_is_idle_on_empty_queue() {
        let consumer = ConsumerLoop::new(engine(), fast_config(), |_job| Ok(()));
        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Idle);
    }

    #[test]
    fn failing_handler_retries_then_dead_letters() {
        let engine = engine();
        let id = engine.enqueue("listings", Operation::Update, json!({})).unwrap();
        let consumer = ConsumerLoop::new(engine.clone(), fast_config(), |_job| {
            Err(HandlerError::new("index unavailable"))
        });

        assert_eq!(
            consumer.poll_once().unwrap(),
            PollOutcome::Requeued { job_id: id.clone(), retry_count: 1 }
        );
        assert_eq!(
            consumer.poll_once().unwrap(),
            PollOutcome::Requeued { job_id: id.clone(), retry_count: 2 }
        );
        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::DeadLettered(id));

        let failed = engine.list_jobs(QueueKind::Failed, 1).unwrap();
        assert_eq!(failed[0].error.as_deref(), Some("index unavailable"));
    }

    #[test]
    fn panicking_handler_counts_as_failure() {
        let engine = engine();
        let id = engine.enqueue("listings", Operation::Update, json!({})).unwrap();
        let consumer = ConsumerLoop::new(engine, fast_config(), |_job| panic!("bad payload"));

        assert_eq!(
            consumer.poll_once().unwrap(),
            PollOutcome::Requeued { job_id: id, retry_count: 1 }
        );
    }

    #[test]
    fn slow_handler_is_failed_after_deadline() {
        let engine = engine();
        let id = engine.enqueue("listings", Operation::Update, json!({})).unwrap();
        let config = ConsumerConfig {
            job_timeout: Some(Duration::from_millis(20)),
            max_retries: 0,
            ..fast_config()
        };
        let consumer = ConsumerLoop::new(engine.clone(), config, |_job| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        });

        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::DeadLettered(id));
        let failed = engine.list_jobs(QueueKind::Failed, 1).unwrap();
        assert!(failed[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn spawned_loop_drains_queue_and_shuts_down() {
        let engine = engine();
        for i in 0..5 {
            engine.enqueue("listings", Operation::Insert, json!({"id": i})).unwrap();
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let handle = ConsumerLoop::new(engine.clone(), fast_config(), move |_job| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .spawn()
        .unwrap();

        wait_until(|| engine.get_stats().unwrap().completed == 5);

        let stats = handle.stats();
        assert_eq!(stats.jobs_processed, 5);
        assert_eq!(stats.jobs_succeeded, 5);
        assert_eq!(seen.load(Ordering::SeqCst), 5);

        handle.shutdown();
    }

    #[test]
    fn job_orphaned_by_crash_is_served_after_recovery() {
        let store = InMemoryListStore::arc();
        let first_run = Arc::new(QueueEngine::new(store.clone(), "test"));
        let id = first_run.enqueue("listings", Operation::Update, json!({"id": 9})).unwrap();

        // Dequeued but never reported: the process died mid-handler.
        first_run.dequeue(Duration::ZERO).unwrap();
        drop(first_run);

        let restarted = Arc::new(QueueEngine::new(store, "test"));
        let consumer = ConsumerLoop::new(restarted.clone(), fast_config(), |_job| Ok(()));
        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Idle);

        assert_eq!(consumer.recover_in_flight().unwrap(), 1);
        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Completed(id));

        let stats = restarted.get_stats().unwrap();
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn recovery_without_orphans_is_a_no_op() {
        let engine = engine();
        engine.enqueue("listings", Operation::Insert, json!({})).unwrap();
        let consumer = ConsumerLoop::new(engine.clone(), fast_config(), |_job| Ok(()));

        assert_eq!(consumer.recover_in_flight().unwrap(), 0);
        assert_eq!(engine.get_stats().unwrap().pending, 1);
    }

    /// Store whose every call fails, as when Redis is down.
    struct DownStore;

    impl ListStore for DownStore {
        fn push(&self, _: &str, _: &str) -> Result<(), ListStoreError> {
            Err(ListStoreError::Connection("down".into()))
        }
        fn move_tail_to_head(&self, _: &str, _: &str, _: Duration) -> Result<Option<String>, ListStoreError> {
            Err(ListStoreError::Connection("down".into()))
        }
        fn remove_and_push(&self, _: &str, _: &str, _: &str, _: &str) -> Result<bool, ListStoreError> {
            Err(ListStoreError::Connection("down".into()))
        }
        fn len(&self, _: &str) -> Result<usize, ListStoreError> {
            Err(ListStoreError::Connection("down".into()))
        }
        fn range(&self, _: &str, _: Option<usize>) -> Result<Vec<String>, ListStoreError> {
            Err(ListStoreError::Connection("down".into()))
        }
        fn delete(&self, _: &str) -> Result<usize, ListStoreError> {
            Err(ListStoreError::Connection("down".into()))
        }
        fn ping(&self) -> Result<(), ListStoreError> {
            Err(ListStoreError::Connection("down".into()))
        }
    }

    #[test]
    fn loop_survives_connection_errors() {
        let engine = Arc::new(QueueEngine::new(DownStore, "test"));
        assert!(!engine.test_connection());

        let handle = ConsumerLoop::new(engine, fast_config(), |_job| Ok(()))
            .spawn()
            .unwrap();

        wait_until(|| handle.stats().loop_errors >= 3);
        assert!(!handle.is_finished());

        handle.shutdown();
    }
}
