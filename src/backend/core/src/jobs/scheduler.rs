//! Per-queue dispatch loop.
//!
//! One dispatcher task per job type. Each iteration: honor the pause gate,
//! acquire a worker slot, pop the highest-priority oldest entry, and
//! compare-and-swap its record from queued to active. Entries whose record
//! was cancelled or cleaned in the meantime are discarded on pop; the record
//! store is authoritative.
//!
//! Handlers run in their own task so a panic is caught at the join boundary
//! and recorded as a failure; the dispatch loop never dies with a job.

use metrics::counter;
use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::error::ErrorCode;
use crate::jobs::job::{Job, JobContext};
use crate::jobs::queue::TypeQueue;
use crate::jobs::registry::RegistryInner;

/// Run the dispatch loop for one queue until shutdown.
pub(crate) async fn run_dispatcher(registry: Arc<RegistryInner>, queue: Arc<TypeQueue>) {
    let mut shutdown = registry.shutdown.subscribe();
    info!(job_type = %queue.job_type(), worker_slots = queue.worker_slots(), "Dispatcher started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        if queue.is_paused() {
            tokio::select! {
                _ = queue.wait_for_work() => {}
                _ = shutdown.changed() => {}
            }
            continue;
        }

        // Hold a worker slot before popping so a full pool never drains
        // entries it cannot run.
        let permit = tokio::select! {
            permit = queue.acquire_slot() => match permit {
                Some(permit) => permit,
                None => break,
            },
            _ = shutdown.changed() => continue,
        };

        // Pause may have been requested while waiting for a slot.
        if queue.is_paused() {
            drop(permit);
            continue;
        }

        let Some(job) = next_eligible(&registry, &queue) else {
            drop(permit);
            tokio::select! {
                _ = queue.wait_for_work() => {}
                _ = shutdown.changed() => {}
            }
            continue;
        };

        queue.on_dispatched();

        // Register the cancellation token before yielding to the executor so
        // a concurrent cancel never finds an active record without a token.
        let (token_tx, token_rx) = watch::channel(false);
        registry.active_tokens.insert(job.id, token_tx);

        let registry = Arc::clone(&registry);
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            execute_job(registry, queue, job, token_rx, permit).await;
        });
    }

    info!(job_type = %queue.job_type(), "Dispatcher stopped");
}

/// Pop entries until one activates. Stale entries (record cancelled or
/// cleaned since the push) are dropped silently.
fn next_eligible(registry: &RegistryInner, queue: &TypeQueue) -> Option<Job> {
    while let Some(id) = queue.pop() {
        if let Some(job) = registry.store.try_activate(id) {
            return Some(job);
        }
        debug!(job_id = %id, job_type = %queue.job_type(), "Skipped stale queue entry");
    }
    None
}

/// Execute one activated job and settle its record.
async fn execute_job(
    registry: Arc<RegistryInner>,
    queue: Arc<TypeQueue>,
    job: Job,
    cancellation: watch::Receiver<bool>,
    permit: OwnedSemaphorePermit,
) {
    let job_id = job.id;
    let job_type = job.job_type;

    let ctx = JobContext::new(&job, cancellation);
    let payload = job.payload.clone();

    debug!(job_id = %job_id, job_type = %job_type, attempt = job.attempts, "Job started");

    // Nested task: a panicking handler surfaces as a JoinError here instead
    // of taking the dispatcher down.
    let outcome = match registry.handlers.get(job_type) {
        Some(handler) => tokio::spawn(async move { handler.run(ctx, payload).await }).await,
        None => Ok(Err(crate::error::ConveyorError::missing_handler(job_type))),
    };

    let cancel_requested = registry
        .active_tokens
        .get(&job_id)
        .map(|token| *token.borrow())
        .unwrap_or(false);

    match outcome {
        Ok(Ok(())) => {
            registry.store.settle(job_id, |job| job.mark_completed());
            queue.on_completed();
            counter!("conveyor_jobs_completed_total", "type" => job_type.as_str()).increment(1);
            debug!(job_id = %job_id, job_type = %job_type, "Job completed");
        }
        Ok(Err(err)) if cancel_requested && err.code() == ErrorCode::JobCancelled => {
            registry.store.settle(job_id, |job| job.mark_cancelled());
            queue.on_cancelled_active();
            counter!("conveyor_jobs_cancelled_total", "type" => job_type.as_str()).increment(1);
            info!(job_id = %job_id, job_type = %job_type, "Job acknowledged cancellation");
        }
        Ok(Err(err)) => {
            let message = err.to_string();
            registry.store.settle(job_id, |job| job.mark_failed(&message));
            queue.on_failed();
            counter!("conveyor_jobs_failed_total", "type" => job_type.as_str()).increment(1);
            warn!(job_id = %job_id, job_type = %job_type, error = %message, "Job failed");
        }
        Err(join_err) => {
            let message = format!("handler panicked: {}", join_err);
            registry.store.settle(job_id, |job| job.mark_failed(&message));
            queue.on_failed();
            counter!("conveyor_jobs_failed_total", "type" => job_type.as_str()).increment(1);
            error!(job_id = %job_id, job_type = %job_type, error = %message, "Job panicked");
        }
    }

    // Token removal happens after settling so a concurrent cancel always
    // observes either an active token or a terminal status.
    registry.active_tokens.remove(&job_id);

    // Slot stays occupied until the record is settled.
    drop(permit);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use crate::config::QueuesConfig;
    use crate::error::ConveyorError;
    use crate::jobs::handler::{HandlerRegistry, JobHandler};
    use crate::jobs::job::{JobContext, JobPriority, JobStatus, JobType};
    use crate::jobs::registry::{EnqueueOptions, QueueRegistry};
    use crate::jobs::testing::wait_for_status;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Records the priority of each job it runs, in execution order.
    struct RecordingHandler {
        order: Arc<Mutex<Vec<JobPriority>>>,
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        async fn run(&self, _ctx: JobContext, payload: serde_json::Value) -> crate::error::Result<()> {
            let priority: JobPriority = serde_json::from_value(payload)?;
            self.order.lock().push(priority);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn run(&self, _ctx: JobContext, _payload: serde_json::Value) -> crate::error::Result<()> {
            Err(ConveyorError::internal("smtp relay refused connection"))
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl JobHandler for PanickingHandler {
        async fn run(&self, _ctx: JobContext, _payload: serde_json::Value) -> crate::error::Result<()> {
            panic!("handler bug");
        }
    }

    /// Tracks the peak number of simultaneously running executions.
    struct ConcurrencyMeter {
        running: Arc<AtomicU32>,
        peak: Arc<AtomicU32>,
    }

    #[async_trait]
    impl JobHandler for ConcurrencyMeter {
        async fn run(&self, _ctx: JobContext, _payload: serde_json::Value) -> crate::error::Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_order_priority_then_fifo() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = HandlerRegistry::new();
        handlers.register(
            JobType::EmailSend,
            RecordingHandler {
                order: Arc::clone(&order),
            },
        );

        let config = QueuesConfig {
            email_workers: 1,
            ..QueuesConfig::default()
        };
        let registry = QueueRegistry::new(&config, handlers);
        registry.start();

        // Pause so all three are queued before the single worker runs any.
        registry.pause(JobType::EmailSend).unwrap();

        let mut ids = Vec::new();
        for priority in [JobPriority::Low, JobPriority::High, JobPriority::Normal] {
            let id = registry
                .enqueue(
                    JobType::EmailSend,
                    serde_json::to_value(priority).unwrap(),
                    EnqueueOptions {
                        priority,
                        ..Default::default()
                    },
                )
                .unwrap();
            ids.push(id);
        }

        registry.resume(JobType::EmailSend).unwrap();

        for id in &ids {
            wait_for_status(&registry, JobType::EmailSend, *id, JobStatus::Completed).await;
        }

        assert_eq!(
            *order.lock(),
            vec![JobPriority::High, JobPriority::Normal, JobPriority::Low]
        );
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_fifo_within_priority_class() {
        let order = Arc::new(Mutex::new(Vec::new()));

        struct SeqHandler {
            order: Arc<Mutex<Vec<u64>>>,
        }

        #[async_trait]
        impl JobHandler for SeqHandler {
            async fn run(
                &self,
                _ctx: JobContext,
                payload: serde_json::Value,
            ) -> crate::error::Result<()> {
                let n: u64 = serde_json::from_value(payload)?;
                self.order.lock().push(n);
                Ok(())
            }
        }

        let mut handlers = HandlerRegistry::new();
        handlers.register(
            JobType::DbBatchInsert,
            SeqHandler {
                order: Arc::clone(&order),
            },
        );

        let config = QueuesConfig {
            db_batch_workers: 1,
            ..QueuesConfig::default()
        };
        let registry = QueueRegistry::new(&config, handlers);
        registry.start();
        registry.pause(JobType::DbBatchInsert).unwrap();

        let mut ids = Vec::new();
        for n in 0u64..5 {
            let id = registry
                .enqueue(
                    JobType::DbBatchInsert,
                    serde_json::json!(n),
                    EnqueueOptions::default(),
                )
                .unwrap();
            ids.push(id);
        }
        registry.resume(JobType::DbBatchInsert).unwrap();

        for id in &ids {
            wait_for_status(&registry, JobType::DbBatchInsert, *id, JobStatus::Completed).await;
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_failed_handler_records_error() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(JobType::EmailSend, FailingHandler);

        let registry = QueueRegistry::new(&QueuesConfig::default(), handlers);
        registry.start();

        let id = registry
            .enqueue(
                JobType::EmailSend,
                serde_json::Value::Null,
                EnqueueOptions::default(),
            )
            .unwrap();

        let job = wait_for_status(&registry, JobType::EmailSend, id, JobStatus::Failed).await;
        assert!(job.error.as_deref().unwrap().contains("smtp relay"));
        assert!(job.completed_at.is_some());
        assert_eq!(job.attempts, 1);

        let stats = registry.queue_stats(JobType::EmailSend).unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.active, 0);
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_kill_dispatcher() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(JobType::CacheWarm, PanickingHandler);

        let registry = QueueRegistry::new(&QueuesConfig::default(), handlers);
        registry.start();

        let first = registry
            .enqueue(
                JobType::CacheWarm,
                serde_json::Value::Null,
                EnqueueOptions::default(),
            )
            .unwrap();
        let job = wait_for_status(&registry, JobType::CacheWarm, first, JobStatus::Failed).await;
        assert!(job.error.as_deref().unwrap().contains("panicked"));

        // The dispatcher survives and keeps processing.
        let second = registry
            .enqueue(
                JobType::CacheWarm,
                serde_json::Value::Null,
                EnqueueOptions::default(),
            )
            .unwrap();
        wait_for_status(&registry, JobType::CacheWarm, second, JobStatus::Failed).await;
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_worker_slots() {
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handlers = HandlerRegistry::new();
        handlers.register(
            JobType::BulkImport,
            ConcurrencyMeter {
                running: Arc::clone(&running),
                peak: Arc::clone(&peak),
            },
        );

        let config = QueuesConfig {
            bulk_import_workers: 2,
            ..QueuesConfig::default()
        };
        let registry = QueueRegistry::new(&config, handlers);
        registry.start();

        let mut ids = Vec::new();
        for _ in 0..8 {
            ids.push(
                registry
                    .enqueue(
                        JobType::BulkImport,
                        serde_json::Value::Null,
                        EnqueueOptions::default(),
                    )
                    .unwrap(),
            );
        }

        for id in &ids {
            wait_for_status(&registry, JobType::BulkImport, *id, JobStatus::Completed).await;
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_attempts_and_started_at_set_on_dispatch() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = HandlerRegistry::new();
        handlers.register(
            JobType::EmailSend,
            RecordingHandler {
                order: Arc::clone(&order),
            },
        );

        let registry = QueueRegistry::new(&QueuesConfig::default(), handlers);
        registry.start();

        let id = registry
            .enqueue(
                JobType::EmailSend,
                serde_json::to_value(JobPriority::Normal).unwrap(),
                EnqueueOptions::default(),
            )
            .unwrap();

        let job = wait_for_status(&registry, JobType::EmailSend, id, JobStatus::Completed).await;
        assert_eq!(job.attempts, 1);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.unwrap() >= job.started_at.unwrap());
        registry.shutdown();
    }
}
