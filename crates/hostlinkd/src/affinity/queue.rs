//! FIFO queue drained by the affinity thread.

use std::collections::VecDeque;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use serde_json::Value;
use tracing::{debug, warn};

use super::{AFFINITY_TARGET, AffinityError, Job, JobFailure, Ticket, panic_message};
use crate::registry::HandlerEntry;

/// Counts from a single [`AffinityQueue::drain`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Jobs whose handler ran to completion, successfully or not.
    pub executed: usize,
    /// Jobs skipped because their caller had already timed out.
    pub skipped: usize,
    /// Jobs whose handler returned an error or panicked.
    pub failed: usize,
}

impl DrainReport {
    /// Total jobs removed from the queue.
    #[must_use]
    pub fn total(&self) -> usize {
        self.executed + self.skipped
    }
}

/// Global FIFO of jobs that must run on the affinity thread.
#[derive(Debug, Default)]
pub struct AffinityQueue {
    jobs: Mutex<VecDeque<Job>>,
    capacity: Option<usize>,
    drain_gate: Mutex<()>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("method", &self.method())
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

impl AffinityQueue {
    /// Creates a queue; `capacity` of `None` leaves it unbounded.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            capacity,
            drain_gate: Mutex::new(()),
        }
    }

    /// Enqueues a call to `entry` and returns its completion ticket.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::QueueFull`] when a bounded queue is at
    /// capacity.
    pub fn push(&self, entry: HandlerEntry, params: Value) -> Result<Ticket, AffinityError> {
        let mut jobs = self.lock_jobs();
        if let Some(capacity) = self.capacity
            && jobs.len() >= capacity
        {
            warn!(
                target: AFFINITY_TARGET,
                method = entry.name(),
                capacity,
                "affinity queue full; rejecting job"
            );
            return Err(AffinityError::QueueFull { capacity });
        }
        let (job, ticket) = Job::new(entry, params);
        debug!(
            target: AFFINITY_TARGET,
            method = job.method(),
            depth = jobs.len() + 1,
            "job enqueued"
        );
        jobs.push_back(job);
        Ok(ticket)
    }

    /// Executes every job queued at call time, in FIFO order.
    ///
    /// Jobs enqueued while the drain runs wait for the next call. A nested or
    /// concurrent drain returns immediately with an empty report.
    pub fn drain(&self) -> DrainReport {
        let _gate = match self.drain_gate.try_lock() {
            Ok(gate) => gate,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!(target: AFFINITY_TARGET, "drain already in progress; skipping");
                return DrainReport::default();
            }
        };

        let batch = mem::take(&mut *self.lock_jobs());
        let mut report = DrainReport::default();
        for mut job in batch {
            if job.is_abandoned() {
                debug!(
                    target: AFFINITY_TARGET,
                    method = job.method(),
                    "skipping job abandoned by its caller"
                );
                report.skipped += 1;
                continue;
            }
            let waited = job.enqueued_at.elapsed();
            let params = mem::take(&mut job.params);
            let outcome = run_job(&job, params);
            report.executed += 1;
            if outcome.is_err() {
                report.failed += 1;
            }
            debug!(
                target: AFFINITY_TARGET,
                method = job.method(),
                waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                ok = outcome.is_ok(),
                "job drained"
            );
            job.resolve(outcome);
        }
        report
    }

    /// Fails every queued job with a detachment error and returns the count.
    pub fn fail_all(&self) -> usize {
        let batch = mem::take(&mut *self.lock_jobs());
        let count = batch.len();
        for job in batch {
            job.resolve(Err(JobFailure::Detached));
        }
        if count > 0 {
            warn!(
                target: AFFINITY_TARGET,
                count, "failed queued jobs after affinity thread detached"
            );
        }
        count
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_jobs().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn lock_jobs(&self) -> MutexGuard<'_, VecDeque<Job>> {
        // Jobs run outside this lock, so a poisoned guard still holds a
        // consistent queue.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_job(job: &Job, params: Value) -> Result<Value, JobFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| job.entry.invoke(params))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(JobFailure::Handler(error)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                target: AFFINITY_TARGET,
                method = job.method(),
                message = message.as_str(),
                "handler panicked on the affinity thread"
            );
            Err(JobFailure::Panicked(message))
        }
    }
}
