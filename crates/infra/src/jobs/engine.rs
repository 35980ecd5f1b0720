//! Queue engine: the job lifecycle over four named lists.
//!
//! ```text
//! enqueue ──► pending ──dequeue──► processing ──complete──► completed
//!                ▲                     │
//!                └──── fail (retry) ───┤
//!                                      └── fail (exhausted) ──► failed
//! ```
//!
//! Every transition is a single atomic list-store primitive, so a record is in
//! at most one list at any time. Transitions that address a job by id (`complete`,
//! `fail`) first scan `processing` for the record, then ask the store to remove
//! exactly that serialized value; if another actor got there first the removal
//! finds nothing and the call degrades to a logged no-op.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use indexq_core::{ChangeJob, JobId, Operation, QueueKind, QueueNames, QueueStats};

use super::error::QueueError;
use crate::list_store::ListStore;

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Back in pending with the given retry count.
    Requeued { retry_count: u32 },
    /// Retry budget exhausted, moved to the failed list.
    DeadLettered,
    /// The job was no longer in processing (already completed or failed).
    NotInProcessing,
}

/// Queue engine bound to one logical queue.
#[derive(Debug)]
pub struct QueueEngine<S: ListStore> {
    store: S,
    names: QueueNames,
}

impl<S: ListStore> QueueEngine<S> {
    pub fn new(store: S, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            names: QueueNames::new(queue_name),
        }
    }

    pub fn names(&self) -> &QueueNames {
        &self.names
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn key(&self, kind: QueueKind) -> &str {
        self.names.key(kind)
    }

    /// Enqueue a change and return its fresh id.
    pub fn enqueue(
        &self,
        table: &str,
        operation: Operation,
        payload: serde_json::Value,
    ) -> Result<JobId, QueueError> {
        let job = ChangeJob::new(table, operation, payload)?;
        let record = encode(&job)?;

        self.store.push(self.key(QueueKind::Pending), &record)?;

        debug!(
            queue = %self.names.name(),
            job_id = %job.id,
            table = %job.table,
            operation = %job.operation,
            "job enqueued"
        );
        Ok(job.id)
    }

    /// Take the oldest pending job, moving it to processing.
    ///
    /// Blocks up to `timeout`; returns `None` when nothing arrived in time.
    pub fn dequeue(&self, timeout: Duration) -> Result<Option<ChangeJob>, QueueError> {
        let pending = self.key(QueueKind::Pending);
        let processing = self.key(QueueKind::Processing);
        let Some(raw) = self.store.move_tail_to_head(pending, processing, timeout)? else {
            return Ok(None);
        };

        match ChangeJob::from_record(&raw) {
            Ok(job) => {
                debug!(queue = %self.names.name(), job_id = %job.id, retry_count = job.retry_count, "job dequeued");
                Ok(Some(job))
            }
            Err(e) => {
                // Park it where an operator can see it rather than leaving it
                // stuck in processing forever.
                error!(queue = %self.names.name(), error = %e, record = %raw, "unreadable record moved to failed");
                self.store
                    .remove_and_push(processing, &raw, self.key(QueueKind::Failed), &raw)?;
                Err(QueueError::Deserialization(e.to_string()))
            }
        }
    }

    /// Mark a processing job as done.
    ///
    /// Returns `false` (and logs a warning) when the job is not in processing;
    /// repeated completion is therefore harmless.
    pub fn complete(&self, job_id: &JobId) -> Result<bool, QueueError> {
        let Some((raw, _job)) = self.find_in_processing(job_id)? else {
            warn!(queue = %self.names.name(), job_id = %job_id, "complete: job not in processing");
            return Ok(false);
        };

        let moved = self.store.remove_and_push(
            self.key(QueueKind::Processing),
            &raw,
            self.key(QueueKind::Completed),
            &raw,
        )?;

        if moved {
            debug!(queue = %self.names.name(), job_id = %job_id, "job completed");
        } else {
            warn!(queue = %self.names.name(), job_id = %job_id, "complete: job left processing concurrently");
        }
        Ok(moved)
    }

    /// Report a failed attempt.
    ///
    /// While `retry_count < max_retries` the job goes back to the end of the
    /// pending FIFO with its retry count bumped; otherwise it is dead-lettered
    /// with `error` attached.
    pub fn fail(
        &self,
        job_id: &JobId,
        error: &str,
        max_retries: u32,
    ) -> Result<FailOutcome, QueueError> {
        let Some((raw, job)) = self.find_in_processing(job_id)? else {
            warn!(queue = %self.names.name(), job_id = %job_id, "fail: job not in processing");
            return Ok(FailOutcome::NotInProcessing);
        };

        let (next, target, outcome) = if job.can_retry(max_retries) {
            let next = job.next_attempt();
            let retry_count = next.retry_count;
            (next, QueueKind::Pending, FailOutcome::Requeued { retry_count })
        } else {
            (job.dead_lettered(error), QueueKind::Failed, FailOutcome::DeadLettered)
        };

        let moved = self.store.remove_and_push(
            self.key(QueueKind::Processing),
            &raw,
            self.key(target),
            &encode(&next)?,
        )?;

        if !moved {
            warn!(queue = %self.names.name(), job_id = %job_id, "fail: job left processing concurrently");
            return Ok(FailOutcome::NotInProcessing);
        }

        match outcome {
            FailOutcome::Requeued { retry_count } => info!(
                queue = %self.names.name(),
                job_id = %job_id,
                retry_count,
                max_retries,
                error = %error,
                "job requeued for retry"
            ),
            _ => warn!(
                queue = %self.names.name(),
                job_id = %job_id,
                retry_count = job.retry_count,
                error = %error,
                "job dead-lettered"
            ),
        }
        Ok(outcome)
    }

    /// Lengths of the four lists.
    pub fn get_stats(&self) -> Result<QueueStats, QueueError> {
        Ok(QueueStats::new(
            self.store.len(self.key(QueueKind::Pending))?,
            self.store.len(self.key(QueueKind::Processing))?,
            self.store.len(self.key(QueueKind::Completed))?,
            self.store.len(self.key(QueueKind::Failed))?,
        ))
    }

    /// Drop an entire list, returning how many records it held.
    ///
    /// Clearing pending or processing discards live work.
    pub fn clear_queue(&self, kind: QueueKind) -> Result<usize, QueueError> {
        let removed = self.store.delete(self.key(kind))?;
        info!(queue = %self.names.name(), list = %kind, removed, "queue list cleared");
        Ok(removed)
    }

    /// Move every dead-lettered job back to pending with a fresh retry budget.
    ///
    /// Jobs are moved one at a time, oldest first. A crash part-way leaves the
    /// already-moved prefix in pending and the rest in failed. Records that
    /// cannot be parsed stay in failed.
    pub fn retry_failed_jobs(&self) -> Result<usize, QueueError> {
        let failed = self.key(QueueKind::Failed);
        let pending = self.key(QueueKind::Pending);

        let mut requeued = 0;
        for raw in self.store.range(failed, None)?.iter().rev() {
            let job = match ChangeJob::from_record(raw) {
                Ok(job) => job,
                Err(e) => {
                    warn!(queue = %self.names.name(), error = %e, "retry_failed_jobs: skipping unreadable record");
                    continue;
                }
            };

            if self
                .store
                .remove_and_push(failed, raw, pending, &encode(&job.replayed())?)?
            {
                requeued += 1;
            }
        }

        info!(queue = %self.names.name(), requeued, "failed jobs requeued");
        Ok(requeued)
    }

    /// Move everything in processing back to pending, keeping retry counts.
    ///
    /// For crash recovery at startup; running it while a consumer is active
    /// causes in-flight jobs to be delivered twice.
    pub fn requeue_processing(&self) -> Result<usize, QueueError> {
        let mut requeued = 0;
        while self
            .store
            .move_tail_to_head(
                self.key(QueueKind::Processing),
                self.key(QueueKind::Pending),
                Duration::ZERO,
            )?
            .is_some()
        {
            requeued += 1;
        }

        if requeued > 0 {
            info!(queue = %self.names.name(), requeued, "processing jobs requeued");
        }
        Ok(requeued)
    }

    /// Up to `limit` parsed records of one list, newest first.
    pub fn list_jobs(&self, kind: QueueKind, limit: usize) -> Result<Vec<ChangeJob>, QueueError> {
        let raws = self.store.range(self.key(kind), Some(limit))?;
        Ok(raws
            .iter()
            .filter_map(|raw| ChangeJob::from_record(raw).ok())
            .collect())
    }

    /// Whether the store answers a ping.
    pub fn test_connection(&self) -> bool {
        match self.store.ping() {
            Ok(()) => true,
            Err(e) => {
                warn!(queue = %self.names.name(), error = %e, "store connection test failed");
                false
            }
        }
    }

    fn find_in_processing(&self, job_id: &JobId) -> Result<Option<(String, ChangeJob)>, QueueError> {
        let raws = self.store.range(self.key(QueueKind::Processing), None)?;
        Ok(raws.into_iter().find_map(|raw| {
            let job = ChangeJob::from_record(&raw).ok()?;
            (job.id == *job_id).then_some((raw, job))
        }))
    }
}

fn encode(job: &ChangeJob) -> Result<String, QueueError> {
    job.to_record()
        .map_err(|e| QueueError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list_store::InMemoryListStore;
    use serde_json::json;

    fn engine() -> QueueEngine<InMemoryListStore> {
        QueueEngine::new(InMemoryListStore::new(), "search:sync")
    }

    #[test]
    fn enqueue_pushes_one_pending_record() {
        let engine = engine();
        let id = engine
            .enqueue("listings", Operation::Insert, json!({"id": 1}))
            .unwrap();

        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total, 1);

        let pending = engine.list_jobs(QueueKind::Pending, 10).unwrap();
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].retry_count, 0);
    }

    #[test]
    fn enqueue_rejects_empty_table_without_touching_store() {
        let engine = engine();
        let err = engine.enqueue("", Operation::Insert, json!({})).unwrap_err();

        assert!(matches!(err, QueueError::Validation(_)));
        assert_eq!(engine.get_stats().unwrap().total, 0);
    }

    #[test]
    fn dequeue_moves_job_to_processing() {
        let engine = engine();
        let id = engine.enqueue("offers", Operation::Delete, json!({})).unwrap();

        let job = engine.dequeue(Duration::ZERO).unwrap().unwrap();
        assert_eq!(job.id, id);

        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.processing, 1);
    }

    #[test]
    fn dequeue_on_empty_queue_returns_none() {
        let engine = engine();
        assert!(engine.dequeue(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn unreadable_record_is_parked_in_failed() {
        let engine = engine();
        engine.store().push("search:sync", "{not json").unwrap();

        let err = engine.dequeue(Duration::ZERO).unwrap_err();
        assert!(matches!(err, QueueError::Deserialization(_)));

        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn complete_moves_raw_record_to_completed() {
        let engine = engine();
        let id = engine.enqueue("listings", Operation::Update, json!({"id": 5})).unwrap();
        engine.dequeue(Duration::ZERO).unwrap();

        assert!(engine.complete(&id).unwrap());

        let completed = engine.list_jobs(QueueKind::Completed, 10).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, id);
        assert_eq!(engine.get_stats().unwrap().processing, 0);
    }

    #[test]
    fn complete_unknown_job_is_a_no_op() {
        let engine = engine();
        assert!(!engine.complete(&JobId::from("missing")).unwrap());
        assert_eq!(engine.get_stats().unwrap().total, 0);
    }

    #[test]
    fn fail_with_budget_requeues_with_incremented_count() {
        let engine = engine();
        let id = engine.enqueue("listings", Operation::Update, json!({})).unwrap();
        let first = engine.dequeue(Duration::ZERO).unwrap().unwrap();

        let outcome = engine.fail(&id, "boom", 2).unwrap();
        assert_eq!(outcome, FailOutcome::Requeued { retry_count: 1 });

        let retried = engine.dequeue(Duration::ZERO).unwrap().unwrap();
        assert_eq!(retried.id, id);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.enqueued_at, first.enqueued_at);
        assert!(retried.error.is_none());
    }

    #[test]
    fn fail_without_budget_dead_letters_with_error() {
        let engine = engine();
        let id = engine.enqueue("listings", Operation::Update, json!({})).unwrap();
        engine.dequeue(Duration::ZERO).unwrap();

        assert_eq!(engine.fail(&id, "mapping error", 0).unwrap(), FailOutcome::DeadLettered);

        let failed = engine.list_jobs(QueueKind::Failed, 10).unwrap();
        assert_eq!(failed[0].retry_count, 0);
        assert_eq!(failed[0].error.as_deref(), Some("mapping error"));
        assert_eq!(engine.get_stats().unwrap().pending, 0);
    }

    #[test]
    fn duplicate_fail_does_not_double_count() {
        let engine = engine();
        let id = engine.enqueue("listings", Operation::Update, json!({})).unwrap();
        engine.dequeue(Duration::ZERO).unwrap();

        engine.fail(&id, "boom", 5).unwrap();
        assert_eq!(engine.fail(&id, "boom", 5).unwrap(), FailOutcome::NotInProcessing);

        let pending = engine.list_jobs(QueueKind::Pending, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
    }

    #[test]
    fn clear_queue_returns_removed_count() {
        let engine = engine();
        for i in 0..3 {
            engine.enqueue("listings", Operation::Insert, json!({"id": i})).unwrap();
        }

        assert_eq!(engine.clear_queue(QueueKind::Pending).unwrap(), 3);
        assert_eq!(engine.clear_queue(QueueKind::Pending).unwrap(), 0);
        assert_eq!(engine.get_stats().unwrap().total, 0);
    }

    #[test]
    fn requeue_processing_restores_in_flight_jobs() {
        let engine = engine();
        let a = engine.enqueue("listings", Operation::Insert, json!({})).unwrap();
        let b = engine.enqueue("listings", Operation::Insert, json!({})).unwrap();
        engine.dequeue(Duration::ZERO).unwrap();
        engine.dequeue(Duration::ZERO).unwrap();

        assert_eq!(engine.requeue_processing().unwrap(), 2);

        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.pending, 2);

        // Oldest in-flight job is served first again.
        assert_eq!(engine.dequeue(Duration::ZERO).unwrap().unwrap().id, a);
        assert_eq!(engine.dequeue(Duration::ZERO).unwrap().unwrap().id, b);
    }

    #[test]
    fn retry_failed_skips_unreadable_records() {
        let engine = engine();
        engine.store().push("search:sync:failed", "garbage").unwrap();
        let id = engine.enqueue("listings", Operation::Insert, json!({})).unwrap();
        engine.dequeue(Duration::ZERO).unwrap();
        engine.fail(&id, "boom", 0).unwrap();

        assert_eq!(engine.retry_failed_jobs().unwrap(), 1);

        let stats = engine.get_stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn in_memory_store_always_answers_ping() {
        assert!(engine().test_connection());
    }
}
