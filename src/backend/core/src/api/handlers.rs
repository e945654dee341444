//! Job API request handlers.
//!
//! All handlers return `Result<impl IntoResponse, ConveyorError>` so that
//! errors are converted to HTTP status codes via the `IntoResponse`
//! implementation on `ConveyorError`. The `{type}` path segment is parsed
//! before touching the core, so unknown types never reach a queue.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::AppState;
use crate::error::ConveyorError;
use crate::jobs::control::{CancelOutcome, CleanOptions};
use crate::jobs::job::{JobId, JobPriority, JobStatus, JobType};
use crate::jobs::queue::QueueStats;
use crate::jobs::registry::EnqueueOptions;

fn parse_job_type(raw: &str) -> Result<JobType, ConveyorError> {
    raw.parse()
}

fn parse_job_id(raw: &str) -> Result<JobId, ConveyorError> {
    raw.parse()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Submission
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    /// Opaque handler input
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Priority within the queue
    #[serde(default)]
    pub priority: JobPriority,

    /// Correlation ID
    #[serde(default)]
    pub request_id: Option<String>,

    /// Submitter identity
    #[serde(default)]
    pub submitted_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
}

/// POST /jobs/{type}
pub async fn submit_job(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, ConveyorError> {
    let job_type = parse_job_type(&job_type)?;

    let id = state.registry.enqueue(
        job_type,
        req.payload,
        EnqueueOptions {
            priority: req.priority,
            request_id: req.request_id,
            submitted_by: req.submitted_by,
        },
    )?;

    let response = SubmitJobResponse {
        job_id: id,
        job_type,
        status: JobStatus::Queued,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status
// ═══════════════════════════════════════════════════════════════════════════════

/// GET /jobs/{type}/{jobId}
pub async fn get_job(
    State(state): State<AppState>,
    Path((job_type, job_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ConveyorError> {
    let job_type = parse_job_type(&job_type)?;
    let job_id = parse_job_id(&job_id)?;

    let job = state.registry.get_status(job_type, job_id)?;
    Ok(Json(job))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: JobId,
    pub status: &'static str,
}

/// DELETE /jobs/{type}/{jobId}
pub async fn cancel_job(
    State(state): State<AppState>,
    Path((job_type, job_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ConveyorError> {
    let job_type = parse_job_type(&job_type)?;
    let job_id = parse_job_id(&job_id)?;

    let outcome = state.registry.cancel(job_type, job_id)?;
    let status = match outcome {
        CancelOutcome::Cancelled => "cancelled",
        CancelOutcome::Signalled => "cancellation-requested",
    };

    Ok(Json(CancelResponse { job_id, status }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stats
// ═══════════════════════════════════════════════════════════════════════════════

/// GET /jobs/queues/stats
pub async fn all_queue_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ConveyorError> {
    let stats: BTreeMap<JobType, QueueStats> = state.registry.all_queue_stats();
    Ok(Json(stats))
}

/// GET /jobs/queues/{type}/stats
pub async fn queue_stats(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
) -> Result<impl IntoResponse, ConveyorError> {
    let job_type = parse_job_type(&job_type)?;
    let stats = state.registry.queue_stats(job_type)?;
    Ok(Json(stats))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pause / Resume / Clean
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueControlResponse {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub paused: bool,
}

/// POST /jobs/queues/{type}/pause
pub async fn pause_queue(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
) -> Result<impl IntoResponse, ConveyorError> {
    let job_type = parse_job_type(&job_type)?;
    state.registry.pause(job_type)?;
    Ok(Json(QueueControlResponse {
        job_type,
        paused: true,
    }))
}

/// POST /jobs/queues/{type}/resume
pub async fn resume_queue(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
) -> Result<impl IntoResponse, ConveyorError> {
    let job_type = parse_job_type(&job_type)?;
    state.registry.resume(job_type)?;
    Ok(Json(QueueControlResponse {
        job_type,
        paused: false,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanQueueRequest {
    /// Minimum record age in milliseconds
    #[serde(default)]
    pub grace: u64,

    /// Maximum number of records to remove
    #[serde(default = "default_clean_limit")]
    pub limit: usize,

    /// Terminal status to remove
    pub status: JobStatus,
}

fn default_clean_limit() -> usize {
    1000
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanQueueResponse {
    pub cleaned_jobs: usize,
    pub job_ids: Vec<JobId>,
}

/// POST /jobs/queues/{type}/clean
pub async fn clean_queue(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
    Json(req): Json<CleanQueueRequest>,
) -> Result<impl IntoResponse, ConveyorError> {
    let job_type = parse_job_type(&job_type)?;

    let removed = state.registry.clean(
        job_type,
        CleanOptions {
            grace_ms: req.grace,
            limit: req.limit,
            status: req.status,
        },
    )?;

    Ok(Json(CleanQueueResponse {
        cleaned_jobs: removed.len(),
        job_ids: removed,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
