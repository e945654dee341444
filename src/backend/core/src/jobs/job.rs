//! Job data model.
//!
//! This module provides the core types of the job subsystem:
//!
//! - **JobType**: Closed enumeration of background work the platform runs
//! - **JobPriority / JobStatus**: Ordering and lifecycle state
//! - **Job**: The durable record tracked from submission to removal
//! - **JobContext**: Context passed to handlers during execution, including
//!   the cooperative cancellation token

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ConveyorError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a job instance. Never reused, even after cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for JobId {
    type Err = ConveyorError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ConveyorError::validation(format!("Invalid job id: {}", s)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The closed set of background job types the platform processes.
///
/// Each variant gets its own queue and worker pool. Adding a variant means
/// registering a handler and a pool size; unknown strings are rejected at
/// the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Bulk catalog imports
    BulkImport,
    /// AI product description / content generation
    AiContentGeneration,
    /// Cache warming after catalog changes
    CacheWarm,
    /// Transactional email delivery
    EmailSend,
    /// Batched AI processing over many records
    AiBatchProcessing,
    /// Database batch inserts
    DbBatchInsert,
}

impl JobType {
    /// All job types, in declaration order.
    pub const ALL: [JobType; 6] = [
        Self::BulkImport,
        Self::AiContentGeneration,
        Self::CacheWarm,
        Self::EmailSend,
        Self::AiBatchProcessing,
        Self::DbBatchInsert,
    ];

    /// Wire name of this job type (kebab-case).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BulkImport => "bulk-import",
            Self::AiContentGeneration => "ai-content-generation",
            Self::CacheWarm => "cache-warm",
            Self::EmailSend => "email-send",
            Self::AiBatchProcessing => "ai-batch-processing",
            Self::DbBatchInsert => "db-batch-insert",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ConveyorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bulk-import" => Ok(Self::BulkImport),
            "ai-content-generation" => Ok(Self::AiContentGeneration),
            "cache-warm" => Ok(Self::CacheWarm),
            "email-send" => Ok(Self::EmailSend),
            "ai-batch-processing" => Ok(Self::AiBatchProcessing),
            "db-batch-insert" => Ok(Self::DbBatchInsert),
            other => Err(ConveyorError::unknown_job_type(other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a job. Transitions are monotonic: a terminal status
/// is never left, and `Active` never returns to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the queue
    Queued,
    /// Currently being executed by a worker
    Active,
    /// Handler finished successfully
    Completed,
    /// Handler returned an error or panicked
    Failed,
    /// Cancelled before or during execution
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Priority
// ═══════════════════════════════════════════════════════════════════════════════

/// Priority level for jobs within a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    /// Lowest priority - processed when nothing else is waiting
    Low = 0,
    /// Normal priority - default for most jobs
    Normal = 1,
    /// High priority - processed before normal jobs
    High = 2,
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl JobPriority {
    /// Get the numeric value for queue ordering.
    pub fn score(&self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Normal => 100,
            Self::High => 200,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Record
// ═══════════════════════════════════════════════════════════════════════════════

/// The record tracked for every submitted job, from submission until it is
/// removed by `clean`.
///
/// The payload is opaque to the core: it is stored and handed to the handler
/// verbatim, never validated or logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Job type (determines queue and handler)
    #[serde(rename = "type")]
    pub job_type: JobType,

    /// Opaque handler input
    pub payload: serde_json::Value,

    /// Priority within the queue
    pub priority: JobPriority,

    /// Current lifecycle state
    pub status: JobStatus,

    /// When the job was submitted
    pub created_at: DateTime<Utc>,

    /// When execution first started (set at most once)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state (set at most once)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of dispatches (informational; there is no automatic retry)
    pub attempts: u32,

    /// Failure message (set only when the job fails)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Correlation ID propagated from the submitting request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Identity of the submitter, for audit trails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<String>,
}

impl Job {
    /// Create a new job in the `Queued` state.
    pub fn new(job_type: JobType, payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            payload,
            priority: JobPriority::default(),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            attempts: 0,
            error: None,
            request_id: None,
            submitted_by: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the correlation ID.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Set the submitter identity.
    pub fn with_submitted_by(mut self, who: impl Into<String>) -> Self {
        self.submitted_by = Some(who.into());
        self
    }

    /// Mark as active. `started_at` is set only on the first dispatch.
    pub fn mark_active(&mut self) {
        self.status = JobStatus::Active;
        self.started_at.get_or_insert_with(Utc::now);
        self.attempts += 1;
    }

    /// Mark as completed.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at.get_or_insert_with(Utc::now);
    }

    /// Mark as failed with the handler's error message.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.completed_at.get_or_insert_with(Utc::now);
        self.error = Some(error.into());
    }

    /// Mark as cancelled. `completed_at` is set so that `clean` grace
    /// windows apply to cancelled jobs too.
    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at.get_or_insert_with(Utc::now);
    }

    /// Get the execution duration if the job has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Context passed to handlers during execution.
///
/// Cancellation is cooperative: the controller flips the watch channel, and
/// a handler that honors it stops at a safe point and returns the
/// distinguished job-cancelled error.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID
    pub job_id: JobId,
    /// Job type
    pub job_type: JobType,
    /// Dispatch number (1-indexed)
    pub attempt: u32,
    /// Correlation ID from the submitting request
    pub request_id: Option<String>,
    /// Cancellation token
    cancellation: tokio::sync::watch::Receiver<bool>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: &Job, cancellation: tokio::sync::watch::Receiver<bool>) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            attempt: job.attempts,
            request_id: job.request_id.clone(),
            cancellation,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.cancellation.borrow()
    }

    /// Wait until cancellation is requested.
    ///
    /// Resolves immediately if cancellation was already requested. If the
    /// controller side is gone, this pends forever; the job simply runs to
    /// completion.
    pub async fn cancelled(&mut self) {
        if *self.cancellation.borrow() {
            return;
        }
        while self.cancellation.changed().await.is_ok() {
            if *self.cancellation.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }

    /// Run a future, abandoning it if cancellation is requested first.
    ///
    /// Returns `None` on cancellation.
    pub async fn cancellable<F, T>(&mut self, future: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        let mut cancellation = self.cancellation.clone();
        tokio::select! {
            result = future => Some(result),
            _ = cancellation.wait_for(|cancelled| *cancelled) => None,
        }
    }

    /// Return the distinguished cancellation error if cancellation has been
    /// requested. Handlers call this at safe checkpoints.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ConveyorError::job_cancelled(self.job_id))
        } else {
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);

        let uuid = Uuid::new_v4();
        let id = JobId::from_uuid(uuid);
        assert_eq!(id.0, uuid);
    }

    #[test]
    fn test_job_type_round_trip() {
        for job_type in JobType::ALL {
            let parsed: JobType = job_type.as_str().parse().unwrap();
            assert_eq!(parsed, job_type);
        }

        assert!("video-transcode".parse::<JobType>().is_err());
        // Wire names are exact: no case folding
        assert!("Email-Send".parse::<JobType>().is_err());
    }

    #[test]
    fn test_job_type_serde_kebab_case() {
        let json = serde_json::to_string(&JobType::AiContentGeneration).unwrap();
        assert_eq!(json, "\"ai-content-generation\"");

        let parsed: JobType = serde_json::from_str("\"db-batch-insert\"").unwrap();
        assert_eq!(parsed, JobType::DbBatchInsert);
    }

    #[test]
    fn test_job_status() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
    }

    #[test]
    fn test_job_priority_ordering() {
        assert!(JobPriority::High > JobPriority::Normal);
        assert!(JobPriority::Normal > JobPriority::Low);
        assert!(JobPriority::High.score() > JobPriority::Normal.score());
    }

    #[test]
    fn test_job_lifecycle_marks() {
        let mut job = Job::new(JobType::EmailSend, serde_json::json!({"to": "a@b.c"}))
            .with_priority(JobPriority::High)
            .with_request_id("req-1");

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.started_at.is_none());

        job.mark_active();
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.attempts, 1);
        let first_start = job.started_at.unwrap();

        // started_at is write-once
        job.mark_active();
        assert_eq!(job.started_at.unwrap(), first_start);

        job.mark_completed();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.duration().is_some());
    }

    #[test]
    fn test_mark_failed_records_error() {
        let mut job = Job::new(JobType::BulkImport, serde_json::Value::Null);
        job.mark_active();
        job.mark_failed("upstream rejected row 42");

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("upstream rejected row 42"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_mark_cancelled_sets_completed_at() {
        let mut job = Job::new(JobType::CacheWarm, serde_json::Value::Null);
        job.mark_cancelled();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_job_wire_format() {
        let job = Job::new(JobType::EmailSend, serde_json::json!({"to": "a@b.c"}));
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["type"], "email-send");
        assert_eq!(json["status"], "queued");
        assert!(json.get("createdAt").is_some());
        // Unset optionals are omitted
        assert!(json.get("startedAt").is_none());
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_context_cancellation() {
        let job = Job::new(JobType::AiBatchProcessing, serde_json::Value::Null);
        let (tx, rx) = tokio::sync::watch::channel(false);
        let mut ctx = JobContext::new(&job, rx);

        assert!(!ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_ok());

        tx.send(true).unwrap();
        assert!(ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_err());
        ctx.cancelled().await;
    }

    #[tokio::test]
    async fn test_context_cancellable_future() {
        let job = Job::new(JobType::AiBatchProcessing, serde_json::Value::Null);
        let (tx, rx) = tokio::sync::watch::channel(false);
        let mut ctx = JobContext::new(&job, rx);

        // Completes normally when not cancelled
        let result = ctx.cancellable(async { 42 }).await;
        assert_eq!(result, Some(42));

        // Abandoned when cancelled first
        tx.send(true).unwrap();
        let result = ctx
            .cancellable(std::future::pending::<()>())
            .await;
        assert_eq!(result, None);
    }
}
