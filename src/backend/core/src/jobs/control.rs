//! Lifecycle control: cancel, pause, resume, clean.
//!
//! Cancellation semantics differ by state. A queued job is cancelled
//! authoritatively: the record flips to cancelled and the dispatcher will
//! discard its queue entry, so it can never run. An active job only gets a
//! cancellation signal; whether it stops early is up to the handler.

use chrono::{Duration, Utc};
use metrics::counter;
use tracing::{debug, info};

use crate::error::{ConveyorError, ErrorCode, Result};
use crate::jobs::job::{JobId, JobStatus, JobType};
use crate::jobs::registry::QueueRegistry;

/// What a cancel request achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was queued and is now cancelled. It will never execute.
    Cancelled,
    /// The job is active; cancellation was signalled to the handler.
    Signalled,
}

/// Parameters for [`QueueRegistry::clean`].
#[derive(Debug, Clone, Copy)]
pub struct CleanOptions {
    /// Minimum age (milliseconds since `completed_at`) a record must have
    /// to be removed.
    pub grace_ms: u64,
    /// Maximum number of records to remove.
    pub limit: usize,
    /// Terminal status to remove.
    pub status: JobStatus,
}

impl QueueRegistry {
    /// Cancel a job.
    ///
    /// # Errors
    ///
    /// Not-found for unknown or cleaned ids (or ids of another type);
    /// conflict for jobs already in a terminal state.
    pub fn cancel(&self, job_type: JobType, id: JobId) -> Result<CancelOutcome> {
        // The job may move queued -> active between the snapshot and the
        // cancel attempt; retry against the fresh state.
        loop {
            let job = self.get_status(job_type, id)?;

            match job.status {
                JobStatus::Queued => {
                    if self.inner.store.try_cancel_queued(id) {
                        self.queue(job_type)?.on_cancelled_queued();
                        counter!("conveyor_jobs_cancelled_total", "type" => job_type.as_str())
                            .increment(1);
                        info!(job_id = %id, job_type = %job_type, "Queued job cancelled");
                        return Ok(CancelOutcome::Cancelled);
                    }
                    // Lost the race; re-read and try again.
                }
                JobStatus::Active => {
                    match self.inner.active_tokens.get(&id) {
                        Some(token) => {
                            // send_replace: the signal sticks even if the
                            // handler dropped its receiver.
                            token.send_replace(true);
                            info!(job_id = %id, job_type = %job_type, "Cancellation signalled to active job");
                            return Ok(CancelOutcome::Signalled);
                        }
                        // Settled between the snapshot and the token lookup.
                        None => continue,
                    }
                }
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                    return Err(ConveyorError::job_already_finished(id));
                }
            }
        }
    }

    /// Pause dispatch for a queue. Queued jobs keep accumulating in order;
    /// running jobs are unaffected.
    pub fn pause(&self, job_type: JobType) -> Result<()> {
        self.queue(job_type)?.pause();
        info!(job_type = %job_type, "Queue paused");
        Ok(())
    }

    /// Resume dispatch for a queue.
    pub fn resume(&self, job_type: JobType) -> Result<()> {
        self.queue(job_type)?.resume();
        info!(job_type = %job_type, "Queue resumed");
        Ok(())
    }

    /// Remove old terminal records of one status, oldest first.
    ///
    /// Returns the removed ids. Cleaned ids are not-found afterwards.
    ///
    /// # Errors
    ///
    /// Validation error if `status` is not terminal.
    pub fn clean(&self, job_type: JobType, options: CleanOptions) -> Result<Vec<JobId>> {
        if !options.status.is_terminal() {
            return Err(ConveyorError::new(
                ErrorCode::InvalidStatusFilter,
                format!(
                    "Cannot clean jobs in non-terminal status: {}",
                    options.status
                ),
            ));
        }

        // grace_ms arrives straight off the wire; clamp instead of wrapping.
        let grace = Duration::milliseconds(i64::try_from(options.grace_ms).unwrap_or(i64::MAX));
        let Some(cutoff) = Utc::now().checked_sub_signed(grace) else {
            // Grace reaches past representable time: nothing is old enough.
            return Ok(Vec::new());
        };
        let removed =
            self.inner
                .store
                .remove_terminal(job_type, options.status, cutoff, options.limit);

        let queue = self.queue(job_type)?;
        for _ in &removed {
            queue.on_cleaned(options.status);
        }

        counter!("conveyor_jobs_cleaned_total", "type" => job_type.as_str())
            .increment(removed.len() as u64);
        debug!(
            job_type = %job_type,
            status = %options.status,
            cleaned = removed.len(),
            "Queue cleaned"
        );

        Ok(removed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
