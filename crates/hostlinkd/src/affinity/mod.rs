//! Marshalling of handler calls onto the host's affinity thread.
//!
//! Callers push a [`Job`] onto the [`AffinityQueue`] and receive a
//! [`Ticket`], a one-shot completion handle they can wait on with a bound.
//! The host calls [`AffinityQueue::drain`] once per tick from its affinity
//! thread; each drain executes the jobs present when it started, one at a
//! time and in enqueue order, and resolves every ticket by sending on a
//! channel. Nothing on the drain side touches the caller's thread.

mod queue;

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use crate::registry::{HandlerEntry, HandlerError};

pub use self::queue::{AffinityQueue, DrainReport};

/// Tracing target for affinity queue operations.
pub(crate) const AFFINITY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::affinity");

/// Failures observed by a caller waiting on an affinity job.
#[derive(Debug, Error)]
pub enum AffinityError {
    /// The handler itself failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The handler panicked on the affinity thread.
    #[error("handler '{method}' panicked: {message}")]
    Panicked {
        /// Method whose handler panicked.
        method: String,
        /// Panic payload rendered as text.
        message: String,
    },

    /// The job was not drained or finished within the wait bound.
    #[error("timed out after {}ms waiting for '{method}' on the affinity thread", .timeout.as_millis())]
    Timeout {
        /// Method that timed out.
        method: String,
        /// Bound that elapsed.
        timeout: Duration,
    },

    /// The queue was at capacity.
    #[error("server busy: affinity queue is full ({capacity} jobs)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The affinity thread detached before running the job.
    #[error("affinity thread detached before '{method}' ran")]
    Detached {
        /// Method that was pending.
        method: String,
    },

    /// The job was dropped without a result.
    #[error("affinity job for '{method}' was dropped without a result")]
    Abandoned {
        /// Method that was pending.
        method: String,
    },
}

#[derive(Debug)]
enum JobFailure {
    Handler(HandlerError),
    Panicked(String),
    Detached,
}

type JobOutcome = Result<Value, JobFailure>;

/// A queued handler invocation awaiting the affinity thread.
pub struct Job {
    entry: HandlerEntry,
    params: Value,
    reply: SyncSender<JobOutcome>,
    abandoned: Arc<AtomicBool>,
    enqueued_at: Instant,
}

impl Job {
    fn new(entry: HandlerEntry, params: Value) -> (Self, Ticket) {
        let (reply, receiver) = mpsc::sync_channel(1);
        let abandoned = Arc::new(AtomicBool::new(false));
        let method = entry.name().to_owned();
        let job = Self {
            entry,
            params,
            reply,
            abandoned: Arc::clone(&abandoned),
            enqueued_at: Instant::now(),
        };
        let ticket = Ticket {
            method,
            receiver,
            abandoned,
        };
        (job, ticket)
    }

    /// Method the job will invoke.
    #[must_use]
    pub fn method(&self) -> &str {
        self.entry.name()
    }

    fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    fn resolve(self, outcome: JobOutcome) {
        // The waiter may already have given up; its result is discarded.
        self.reply.try_send(outcome).ok();
    }
}

/// Completion handle for a queued [`Job`].
#[derive(Debug)]
pub struct Ticket {
    method: String,
    receiver: Receiver<JobOutcome>,
    abandoned: Arc<AtomicBool>,
}

impl Ticket {
    /// Method the ticket is waiting on.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Blocks until the job resolves or `timeout` elapses.
    ///
    /// On timeout the job is marked abandoned: a drain that has not reached
    /// it yet skips it, and a result produced later is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError`] for handler failures, panics, detachment,
    /// and timeouts.
    pub fn wait(self, timeout: Duration) -> Result<Value, AffinityError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(JobFailure::Handler(error))) => Err(AffinityError::Handler(error)),
            Ok(Err(JobFailure::Panicked(message))) => Err(AffinityError::Panicked {
                method: self.method,
                message,
            }),
            Ok(Err(JobFailure::Detached)) => Err(AffinityError::Detached {
                method: self.method,
            }),
            Err(RecvTimeoutError::Timeout) => {
                self.abandoned.store(true, Ordering::Release);
                Err(AffinityError::Timeout {
                    method: self.method,
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(AffinityError::Abandoned {
                method: self.method,
            }),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}
