//! Background job processing.
//!
//! Multi-type job queues with priority ordering, bounded per-type worker
//! pools, and full lifecycle control:
//!
//! - **job**: Data model — types, priorities, statuses, the job record, and
//!   the execution context
//! - **handler**: The `JobHandler` trait and the per-type handler registry
//! - **store**: Concurrent job record store
//! - **queue**: Per-type priority queue with O(1) status counters
//! - **registry**: Submission and status API; owns queues, store, handlers
//! - **scheduler**: Per-queue dispatch loop
//! - **control**: Cancel, pause, resume, clean

pub mod control;
pub mod handler;
pub mod job;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use control::{CancelOutcome, CleanOptions};
pub use handler::{HandlerRegistry, JobHandler};
pub use job::{Job, JobContext, JobId, JobPriority, JobStatus, JobType};
pub use queue::QueueStats;
pub use registry::{EnqueueOptions, QueueRegistry};
pub use store::JobStore;

#[cfg(test)]
pub(crate) mod testing {
    use super::handler::{HandlerRegistry, JobHandler};
    use super::job::{Job, JobContext, JobId, JobStatus, JobType};
    use super::registry::QueueRegistry;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn run(
            &self,
            _ctx: JobContext,
            _payload: serde_json::Value,
        ) -> crate::error::Result<()> {
            Ok(())
        }
    }

    /// A registry with a no-op handler for every job type.
    pub(crate) fn noop_handlers() -> HandlerRegistry {
        let mut handlers = HandlerRegistry::new();
        for job_type in JobType::ALL {
            handlers.register(job_type, NoopHandler);
        }
        handlers
    }

    /// Poll until the job reaches the expected status, or panic after ~2s.
    pub(crate) async fn wait_for_status(
        registry: &QueueRegistry,
        job_type: JobType,
        id: JobId,
        expected: JobStatus,
    ) -> Job {
        for _ in 0..200 {
            if let Ok(job) = registry.get_status(job_type, id) {
                if job.status == expected {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {:?}", id, expected);
    }
}
