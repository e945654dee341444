//! Queue registry: one queue and one worker pool per job type.
//!
//! The registry owns the record store, the per-type queues, and the handler
//! registry, and is the single entry point for submission and status reads.
//! Lifecycle operations (cancel/pause/resume/clean) live in
//! [`crate::jobs::control`]; the dispatch loop lives in
//! [`crate::jobs::scheduler`].

use dashmap::DashMap;
use metrics::counter;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::QueuesConfig;
use crate::error::{ConveyorError, ErrorCode, Result};
use crate::jobs::handler::HandlerRegistry;
use crate::jobs::job::{Job, JobId, JobPriority, JobType};
use crate::jobs::queue::{QueueStats, TypeQueue};
use crate::jobs::scheduler;
use crate::jobs::store::JobStore;

// ═══════════════════════════════════════════════════════════════════════════════
// Enqueue Options
// ═══════════════════════════════════════════════════════════════════════════════

/// Optional submission parameters.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Priority within the queue (defaults to normal)
    pub priority: JobPriority,
    /// Correlation ID from the submitting request
    pub request_id: Option<String>,
    /// Identity of the submitter
    pub submitted_by: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared state behind the registry handle.
pub(crate) struct RegistryInner {
    pub(crate) queues: HashMap<JobType, Arc<TypeQueue>>,
    pub(crate) store: JobStore,
    pub(crate) handlers: HandlerRegistry,
    /// Cancellation token senders for currently active jobs.
    pub(crate) active_tokens: DashMap<JobId, watch::Sender<bool>>,
    pub(crate) shutdown: watch::Sender<bool>,
    started: AtomicBool,
}

/// Handle to the job subsystem. Cheap to clone.
#[derive(Clone)]
pub struct QueueRegistry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl QueueRegistry {
    /// Build the registry: one queue per job type, sized from configuration.
    ///
    /// Dispatchers are not running yet; call [`start`](Self::start).
    pub fn new(config: &QueuesConfig, handlers: HandlerRegistry) -> Self {
        let queues = JobType::ALL
            .into_iter()
            .map(|job_type| {
                let slots = config.workers_for(job_type);
                debug!(job_type = %job_type, worker_slots = slots, "Created job queue");
                (job_type, Arc::new(TypeQueue::new(job_type, slots)))
            })
            .collect();

        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(RegistryInner {
                queues,
                store: JobStore::new(),
                handlers,
                active_tokens: DashMap::new(),
                shutdown,
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn one dispatcher task per job type. Idempotent.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        for queue in self.inner.queues.values() {
            let inner = Arc::clone(&self.inner);
            let queue = Arc::clone(queue);
            tokio::spawn(async move {
                scheduler::run_dispatcher(inner, queue).await;
            });
        }

        info!(queues = self.inner.queues.len(), "Job queue registry started");
    }

    /// Signal all dispatchers to stop. Queued jobs stay queued; active jobs
    /// run to completion.
    pub fn shutdown(&self) {
        info!("Job queue registry shutting down");
        // send_replace updates the flag even when no dispatcher is running.
        self.inner.shutdown.send_replace(true);
    }

    /// Look up the queue for a job type.
    pub(crate) fn queue(&self, job_type: JobType) -> Result<&Arc<TypeQueue>> {
        self.inner.queues.get(&job_type).ok_or_else(|| {
            ConveyorError::new(
                ErrorCode::QueueUnavailable,
                format!("No queue for job type: {}", job_type),
            )
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a job. Non-blocking: the record is created in `Queued`, the id
    /// is pushed into the type's queue, the dispatcher is woken, and the id
    /// is returned immediately.
    ///
    /// # Errors
    ///
    /// Fails fast if no handler is registered for the type, or if shutdown
    /// has been initiated.
    pub fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        if *self.inner.shutdown.borrow() {
            return Err(ConveyorError::new(
                ErrorCode::QueueShuttingDown,
                "Job submission rejected: shutting down",
            ));
        }

        if !self.inner.handlers.contains(job_type) {
            return Err(ConveyorError::missing_handler(job_type));
        }

        let mut job = Job::new(job_type, payload).with_priority(options.priority);
        if let Some(request_id) = options.request_id {
            job = job.with_request_id(request_id);
        }
        if let Some(submitted_by) = options.submitted_by {
            job = job.with_submitted_by(submitted_by);
        }

        let id = job.id;
        let priority = job.priority;

        self.inner.store.insert(job);
        self.queue(job_type)?.push(id, priority);

        counter!("conveyor_jobs_enqueued_total", "type" => job_type.as_str()).increment(1);
        debug!(job_id = %id, job_type = %job_type, priority = ?priority, "Job enqueued");

        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status & Stats
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshot a job record.
    ///
    /// Not-found covers unknown ids, cleaned ids, and ids that belong to a
    /// different job type.
    pub fn get_status(&self, job_type: JobType, id: JobId) -> Result<Job> {
        match self.inner.store.get(id) {
            Some(job) if job.job_type == job_type => Ok(job),
            _ => Err(ConveyorError::job_not_found(job_type, id)),
        }
    }

    /// Stats for one queue.
    pub fn queue_stats(&self, job_type: JobType) -> Result<QueueStats> {
        Ok(self.queue(job_type)?.stats())
    }

    /// Stats for every queue, keyed by type in declaration-stable order.
    pub fn all_queue_stats(&self) -> BTreeMap<JobType, QueueStats> {
        self.inner
            .queues
            .iter()
            .map(|(job_type, queue)| (*job_type, queue.stats()))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobStatus;
    use crate::jobs::testing::noop_handlers;

    fn registry() -> QueueRegistry {
        // Not started: submission and reads work without dispatchers.
        QueueRegistry::new(&QueuesConfig::default(), noop_handlers())
    }

    #[tokio::test]
    async fn test_enqueue_and_get_status() {
        let registry = registry();

        let id = registry
            .enqueue(
                JobType::EmailSend,
                serde_json::json!({"to": "a@b.c"}),
                EnqueueOptions {
                    priority: JobPriority::High,
                    request_id: Some("req-9".into()),
                    submitted_by: Some("admin".into()),
                },
            )
            .unwrap();

        let job = registry.get_status(JobType::EmailSend, id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.request_id.as_deref(), Some("req-9"));
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn test_get_status_wrong_type_is_not_found() {
        let registry = registry();
        let id = registry
            .enqueue(
                JobType::EmailSend,
                serde_json::Value::Null,
                EnqueueOptions::default(),
            )
            .unwrap();

        let err = registry.get_status(JobType::CacheWarm, id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobNotFound);
    }

    #[tokio::test]
    async fn test_enqueue_without_handler_fails_fast() {
        let registry = QueueRegistry::new(&QueuesConfig::default(), HandlerRegistry::new());

        let err = registry
            .enqueue(
                JobType::BulkImport,
                serde_json::Value::Null,
                EnqueueOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingHandler);
    }

    #[tokio::test]
    async fn test_enqueue_rejected_after_shutdown() {
        let registry = registry();
        registry.shutdown();

        let err = registry
            .enqueue(
                JobType::EmailSend,
                serde_json::Value::Null,
                EnqueueOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::QueueShuttingDown);
    }

    #[tokio::test]
    async fn test_all_queue_stats_covers_every_type() {
        let registry = registry();
        let stats = registry.all_queue_stats();

        assert_eq!(stats.len(), JobType::ALL.len());
        for job_type in JobType::ALL {
            assert!(stats.contains_key(&job_type));
        }
    }

    #[tokio::test]
    async fn test_queue_stats_reflect_waiting() {
        let registry = registry();
        for _ in 0..3 {
            registry
                .enqueue(
                    JobType::DbBatchInsert,
                    serde_json::Value::Null,
                    EnqueueOptions::default(),
                )
                .unwrap();
        }

        let stats = registry.queue_stats(JobType::DbBatchInsert).unwrap();
        assert_eq!(stats.waiting, 3);
        assert_eq!(stats.active, 0);
    }
}
