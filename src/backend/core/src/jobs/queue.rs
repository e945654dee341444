//! Per-type queue: stable priority ordering, pause gate, worker slots,
//! and O(1) status counters.
//!
//! Ordering is priority-major, submission-order-minor. Each push takes a
//! ticket from a monotonic counter, so jobs of equal priority dequeue in
//! strict submission order; there are no timestamp ties.
//!
//! Cancelled queued jobs are not dug out of the heap: the record store is
//! authoritative, and the dispatcher discards entries whose record is no
//! longer queued when it pops them.

use parking_lot::Mutex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::jobs::job::{JobId, JobPriority, JobStatus, JobType};

// ═══════════════════════════════════════════════════════════════════════════════
// Pending Entries
// ═══════════════════════════════════════════════════════════════════════════════

/// A queued entry awaiting dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEntry {
    id: JobId,
    priority: JobPriority,
    /// Submission ticket; lower means submitted earlier.
    seq: u64,
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then earlier submission first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status Counters
// ═══════════════════════════════════════════════════════════════════════════════

/// Incrementally maintained per-status counts. Updated on every transition
/// so stats reads never scan the record store.
#[derive(Debug, Default)]
struct QueueCounters {
    waiting: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queue Stats
// ═══════════════════════════════════════════════════════════════════════════════

/// Point-in-time view of one queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Job type this queue serves
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Jobs waiting for a worker
    pub waiting: u64,
    /// Jobs currently executing
    pub active: u64,
    /// Jobs completed successfully (still in the store)
    pub completed: u64,
    /// Jobs failed (still in the store)
    pub failed: u64,
    /// Jobs cancelled (still in the store)
    pub cancelled: u64,
    /// Whether dispatch is paused
    pub paused: bool,
    /// Configured worker pool size
    pub worker_slots: usize,
    /// Worker slots currently occupied
    pub workers_busy: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Type Queue
// ═══════════════════════════════════════════════════════════════════════════════

/// The queue for a single job type.
#[derive(Debug)]
pub struct TypeQueue {
    job_type: JobType,
    pending: Mutex<BinaryHeap<PendingEntry>>,
    /// Submission ticket counter.
    seq: AtomicU64,
    paused: AtomicBool,
    /// Wakes the dispatcher on push and resume.
    notify: Notify,
    /// Bounds concurrent executions for this type.
    semaphore: Arc<Semaphore>,
    worker_slots: usize,
    counters: QueueCounters,
}

impl TypeQueue {
    /// Create a queue with the given worker pool size.
    pub fn new(job_type: JobType, worker_slots: usize) -> Self {
        Self {
            job_type,
            pending: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            notify: Notify::new(),
            semaphore: Arc::new(Semaphore::new(worker_slots)),
            worker_slots,
            counters: QueueCounters::default(),
        }
    }

    /// Job type this queue serves.
    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    /// Configured worker pool size.
    pub fn worker_slots(&self) -> usize {
        self.worker_slots
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ordering
    // ─────────────────────────────────────────────────────────────────────────

    /// Push a queued job and wake the dispatcher.
    pub fn push(&self, id: JobId, priority: JobPriority) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.pending.lock().push(PendingEntry { id, priority, seq });
        self.counters.waiting.fetch_add(1, AtomicOrdering::Relaxed);
        self.notify.notify_one();
    }

    /// Pop the highest-priority, oldest entry.
    ///
    /// The returned id may belong to a record that was cancelled after it
    /// was pushed; the caller re-checks against the store.
    pub fn pop(&self) -> Option<JobId> {
        self.pending.lock().pop().map(|entry| entry.id)
    }

    /// Number of entries in the heap, stale ones included.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pause / Resume
    // ─────────────────────────────────────────────────────────────────────────

    /// Stop dispatching. Queued jobs keep their ordering; running jobs are
    /// unaffected.
    pub fn pause(&self) {
        self.paused.store(true, AtomicOrdering::SeqCst);
    }

    /// Resume dispatching and wake the dispatcher.
    pub fn resume(&self) {
        self.paused.store(false, AtomicOrdering::SeqCst);
        self.notify.notify_one();
    }

    /// Check the pause gate.
    pub fn is_paused(&self) -> bool {
        self.paused.load(AtomicOrdering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatcher Support
    // ─────────────────────────────────────────────────────────────────────────

    /// Wait until woken by a push or a resume.
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }

    /// Acquire a worker slot. Resolves when one frees up.
    ///
    /// Returns `None` only if the semaphore is closed (shutdown).
    pub async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Counter Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// A queued job started executing.
    pub fn on_dispatched(&self) {
        self.counters.waiting.fetch_sub(1, AtomicOrdering::Relaxed);
        self.counters.active.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// An active job completed.
    pub fn on_completed(&self) {
        self.counters.active.fetch_sub(1, AtomicOrdering::Relaxed);
        self.counters.completed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// An active job failed.
    pub fn on_failed(&self) {
        self.counters.active.fetch_sub(1, AtomicOrdering::Relaxed);
        self.counters.failed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// A queued job was cancelled before dispatch.
    pub fn on_cancelled_queued(&self) {
        self.counters.waiting.fetch_sub(1, AtomicOrdering::Relaxed);
        self.counters.cancelled.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// An active job acknowledged cancellation.
    pub fn on_cancelled_active(&self) {
        self.counters.active.fetch_sub(1, AtomicOrdering::Relaxed);
        self.counters.cancelled.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// A terminal record was removed by clean.
    pub fn on_cleaned(&self, status: JobStatus) {
        let counter = match status {
            JobStatus::Completed => &self.counters.completed,
            JobStatus::Failed => &self.counters.failed,
            JobStatus::Cancelled => &self.counters.cancelled,
            // clean only accepts terminal statuses
            JobStatus::Queued | JobStatus::Active => return,
        };
        counter.fetch_sub(1, AtomicOrdering::Relaxed);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stats
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshot this queue's stats. O(1): counters plus semaphore state.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            job_type: self.job_type,
            waiting: self.counters.waiting.load(AtomicOrdering::Relaxed),
            active: self.counters.active.load(AtomicOrdering::Relaxed),
            completed: self.counters.completed.load(AtomicOrdering::Relaxed),
            failed: self.counters.failed.load(AtomicOrdering::Relaxed),
            cancelled: self.counters.cancelled.load(AtomicOrdering::Relaxed),
            paused: self.is_paused(),
            worker_slots: self.worker_slots,
            workers_busy: self.worker_slots - self.semaphore.available_permits(),
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
    fn test_priority_major_ordering() {
        let queue = TypeQueue::new(JobType::EmailSend, 1);

        let low = JobId::new();
        let high = JobId::new();
        let normal = JobId::new();

        queue.push(low, JobPriority::Low);
        queue.push(high, JobPriority::High);
        queue.push(normal, JobPriority::Normal);

        assert_eq!(queue.pop(), Some(high));
        assert_eq!(queue.pop(), Some(normal));
        assert_eq!(queue.pop(), Some(low));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_fifo_within_priority() {
        let queue = TypeQueue::new(JobType::CacheWarm, 1);

        let ids: Vec<JobId> = (0..5).map(|_| JobId::new()).collect();
        for id in &ids {
            queue.push(*id, JobPriority::Normal);
        }

        for id in &ids {
            assert_eq!(queue.pop(), Some(*id));
        }
    }

    #[test]
    fn test_high_priority_jumps_ahead_but_not_within_class() {
        let queue = TypeQueue::new(JobType::BulkImport, 1);

        let n1 = JobId::new();
        let n2 = JobId::new();
        let h1 = JobId::new();
        let h2 = JobId::new();

        queue.push(n1, JobPriority::Normal);
        queue.push(h1, JobPriority::High);
        queue.push(n2, JobPriority::Normal);
        queue.push(h2, JobPriority::High);

        assert_eq!(queue.pop(), Some(h1));
        assert_eq!(queue.pop(), Some(h2));
        assert_eq!(queue.pop(), Some(n1));
        assert_eq!(queue.pop(), Some(n2));
    }

    #[test]
    fn test_pause_flag_leaves_ordering_untouched() {
        let queue = TypeQueue::new(JobType::DbBatchInsert, 1);
        let id = JobId::new();
        queue.push(id, JobPriority::Normal);

        queue.pause();
        assert!(queue.is_paused());
        assert_eq!(queue.pending_len(), 1);

        queue.resume();
        assert!(!queue.is_paused());
        assert_eq!(queue.pop(), Some(id));
    }

    #[test]
    fn test_counters_track_transitions() {
        let queue = TypeQueue::new(JobType::EmailSend, 2);

        queue.push(JobId::new(), JobPriority::Normal);
        queue.push(JobId::new(), JobPriority::Normal);
        assert_eq!(queue.stats().waiting, 2);

        queue.on_dispatched();
        let stats = queue.stats();
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.active, 1);

        queue.on_completed();
        let stats = queue.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.completed, 1);

        queue.on_cancelled_queued();
        let stats = queue.stats();
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.cancelled, 1);

        queue.on_cleaned(JobStatus::Completed);
        assert_eq!(queue.stats().completed, 0);
    }

    #[tokio::test]
    async fn test_worker_slot_accounting() {
        let queue = TypeQueue::new(JobType::AiBatchProcessing, 1);
        assert_eq!(queue.stats().workers_busy, 0);

        let permit = queue.acquire_slot().await.unwrap();
        assert_eq!(queue.stats().workers_busy, 1);

        drop(permit);
        assert_eq!(queue.stats().workers_busy, 0);
    }

    #[test]
    fn test_stats_wire_format() {
        let queue = TypeQueue::new(JobType::EmailSend, 4);
        let json = serde_json::to_value(queue.stats()).unwrap();

        assert_eq!(json["type"], "email-send");
        assert_eq!(json["workerSlots"], 4);
        assert_eq!(json["paused"], false);
        assert!(json.get("workersBusy").is_some());
    }
}
