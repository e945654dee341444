//! Job handlers and the handler registry.
//!
//! One handler per job type, looked up at dispatch. The registry is built
//! once at startup and frozen; per-type branching lives nowhere else.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::jobs::job::{JobContext, JobType};

// ═══════════════════════════════════════════════════════════════════════════════
// Handler Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// The interface every job handler implements.
///
/// The payload arrives exactly as submitted; interpreting it is the
/// handler's business. A handler that honors cancellation checks the
/// context token at safe points and returns the distinguished
/// job-cancelled error to stop early.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute one job.
    ///
    /// # Errors
    ///
    /// Any error marks the job failed with the error's message, except the
    /// job-cancelled acknowledgment when cancellation was requested.
    async fn run(&self, ctx: JobContext, payload: serde_json::Value) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Handler Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps each job type to its handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register<H>(&mut self, job_type: JobType, handler: H)
    where
        H: JobHandler + 'static,
    {
        self.handlers.insert(job_type, Arc::new(handler));
    }

    /// Register an already-shared handler.
    pub fn register_arc(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Check whether a handler is registered for a job type.
    pub fn contains(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
