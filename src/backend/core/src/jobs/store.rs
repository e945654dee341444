//! Job record store.
//!
//! One record per job id, kept from submission until removed by `clean`.
//! Records live in a sharded concurrent map; every status write happens
//! under the entry lock, so writes to a single record are serialized and
//! readers never observe a half-applied transition.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::jobs::job::{Job, JobId, JobStatus, JobType};

/// Concurrent store of job records, keyed by id.
#[derive(Debug, Default)]
pub struct JobStore {
    records: DashMap<JobId, Job>,
}

impl JobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Insert a freshly created record.
    pub fn insert(&self, job: Job) {
        self.records.insert(job.id, job);
    }

    /// Snapshot a record by id.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.records.get(&id).map(|entry| entry.clone())
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Compare-and-swap a record from `Queued` to `Active`.
    ///
    /// Returns a snapshot of the activated record, or `None` if the record
    /// is gone or no longer queued (cancelled or cleaned in the meantime).
    /// The dispatcher uses this to skip stale queue entries.
    pub fn try_activate(&self, id: JobId) -> Option<Job> {
        let mut entry = self.records.get_mut(&id)?;
        if entry.status != JobStatus::Queued {
            return None;
        }
        entry.mark_active();
        Some(entry.clone())
    }

    /// Compare-and-swap a record from `Queued` to `Cancelled`.
    ///
    /// Authoritative queued cancellation: once this succeeds the job can
    /// never run, regardless of its position in the queue.
    pub fn try_cancel_queued(&self, id: JobId) -> bool {
        match self.records.get_mut(&id) {
            Some(mut entry) if entry.status == JobStatus::Queued => {
                entry.mark_cancelled();
                true
            }
            _ => false,
        }
    }

    /// Apply a terminal transition to an active record.
    ///
    /// The closure runs under the entry lock and only if the record is
    /// still `Active`; returns the settled snapshot.
    pub fn settle<F>(&self, id: JobId, apply: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut entry = self.records.get_mut(&id)?;
        if entry.status != JobStatus::Active {
            return None;
        }
        apply(&mut entry);
        Some(entry.clone())
    }

    /// Remove terminal records of one type and status whose `completed_at`
    /// is at or before `cutoff`, oldest first, up to `limit`.
    ///
    /// Returns the removed ids. Records that changed under our feet between
    /// the scan and the removal are left alone.
    pub fn remove_terminal(
        &self,
        job_type: JobType,
        status: JobStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Vec<JobId> {
        let mut candidates: Vec<(JobId, DateTime<Utc>)> = self
            .records
            .iter()
            .filter(|entry| {
                entry.job_type == job_type
                    && entry.status == status
                    && entry.completed_at.map_or(false, |at| at <= cutoff)
            })
            .map(|entry| (entry.id, entry.completed_at.unwrap_or(entry.created_at)))
            .collect();

        candidates.sort_by_key(|(_, completed_at)| *completed_at);
        candidates.truncate(limit);

        let mut removed = Vec::with_capacity(candidates.len());
        for (id, _) in candidates {
            // Re-check under the entry lock: the scan snapshot may be stale.
            let taken = self.records.remove_if(&id, |_, job| {
                job.status == status && job.completed_at.map_or(false, |at| at <= cutoff)
            });
            if taken.is_some() {
                removed.push(id);
            }
        }
        removed
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
