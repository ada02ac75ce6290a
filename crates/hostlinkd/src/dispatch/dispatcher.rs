//! Routing of resolved calls to the current thread or the affinity thread.
//!
//! The [`Dispatcher`] owns the handler registry and the affinity queue. A call
//! runs inline when its handler has [`Affinity::Any`], when no affinity thread
//! is attached (headless or test mode), or when the caller already is the
//! affinity thread. Everything else is enqueued, and the caller blocks on the
//! job's ticket for at most the configured call timeout.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use hostlink_config::{Config, DEFAULT_CALL_TIMEOUT_MS};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::errors::DispatchError;
use super::request::{RejectedRequest, Request};
use super::response::ResponseEnvelope;
use crate::affinity::{AffinityQueue, DrainReport, panic_message};
use crate::registry::{Affinity, HandlerEntry, HandlerRegistry};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Tunables for a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// How long a caller waits for an affinity job.
    pub call_timeout: Duration,
    /// Maximum queued affinity jobs; unbounded when `None`.
    pub queue_capacity: Option<usize>,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            queue_capacity: None,
        }
    }
}

impl From<&Config> for DispatcherOptions {
    fn from(config: &Config) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            queue_capacity: config.queue_capacity(),
        }
    }
}

/// Where a call will execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Inline,
    Queued,
}

/// Executes requests against the registry, honouring handler affinity.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    queue: AffinityQueue,
    affinity_thread: RwLock<Option<ThreadId>>,
    call_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher with no affinity thread attached.
    pub fn new(registry: Arc<HandlerRegistry>, options: DispatcherOptions) -> Self {
        Self {
            registry,
            queue: AffinityQueue::new(options.queue_capacity),
            affinity_thread: RwLock::new(None),
            call_timeout: options.call_timeout,
        }
    }

    /// Registry the dispatcher resolves methods against.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Bound applied to affinity waits.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Number of jobs waiting for the affinity thread.
    pub fn queued_jobs(&self) -> usize {
        self.queue.len()
    }

    /// Declares the calling thread as the affinity thread.
    ///
    /// From now on, handlers with [`Affinity::Host`] invoked from any other
    /// thread are queued until this thread calls [`Dispatcher::drain`].
    pub fn attach_affinity_thread(&self) {
        let current = thread::current();
        let mut slot = self
            .affinity_thread
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *slot
            && previous != current.id()
        {
            warn!(
                target: DISPATCH_TARGET,
                previous = ?previous,
                "replacing attached affinity thread"
            );
        }
        *slot = Some(current.id());
        info!(
            target: DISPATCH_TARGET,
            thread = current.name().unwrap_or("<unnamed>"),
            "affinity thread attached"
        );
    }

    /// Detaches the affinity thread and fails every queued job.
    ///
    /// Later calls run inline. Returns the number of jobs that were failed.
    pub fn detach_affinity_thread(&self) -> usize {
        let mut slot = self
            .affinity_thread
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let was_attached = slot.take().is_some();
        let failed = self.queue.fail_all();
        drop(slot);
        if was_attached {
            info!(target: DISPATCH_TARGET, failed, "affinity thread detached");
        }
        failed
    }

    /// Whether an affinity thread is attached.
    pub fn has_affinity_thread(&self) -> bool {
        self.affinity_thread
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs every job queued at call time; the host calls this once per tick.
    ///
    /// Only the attached affinity thread may drain. Calls from any other
    /// thread are refused with an empty report so host-affine handlers never
    /// run off their thread.
    pub fn drain(&self) -> DrainReport {
        let attached = *self
            .affinity_thread
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if attached != Some(thread::current().id()) {
            warn!(
                target: DISPATCH_TARGET,
                attached = attached.is_some(),
                "drain called off the affinity thread; ignoring"
            );
            return DrainReport::default();
        }
        let report = self.queue.drain();
        if report.total() > 0 {
            debug!(
                target: DISPATCH_TARGET,
                executed = report.executed,
                skipped = report.skipped,
                failed = report.failed,
                "affinity queue drained"
            );
        }
        report
    }

    /// Resolves `method` and runs it, inline or via the affinity queue.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MethodNotFound`] for unregistered methods and
    /// a handler-level [`DispatchError`] for failures, panics, timeouts, and a
    /// full queue.
    pub fn call(&self, method: &str, params: Value) -> Result<Value, DispatchError> {
        let entry = self.registry.resolve(method)?;
        let slot = self
            .affinity_thread
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match route_for(&entry, *slot) {
            Route::Inline => {
                drop(slot);
                run_inline(&entry, params)
            }
            Route::Queued => {
                // Holding the read guard across the push keeps a concurrent
                // detach from missing this job.
                let ticket = self.queue.push(entry, params)?;
                drop(slot);
                ticket.wait(self.call_timeout).map_err(DispatchError::from)
            }
        }
    }

    /// Parses, dispatches, and answers one transport message.
    ///
    /// Always produces exactly one response envelope.
    pub fn handle_message(&self, message: &[u8]) -> ResponseEnvelope {
        let request = match Request::parse(message) {
            Ok(request) => request,
            Err(RejectedRequest { id, error }) => {
                warn!(target: DISPATCH_TARGET, %error, id = %id, "rejected request");
                return ResponseEnvelope::failure(id, &error);
            }
        };

        let started = Instant::now();
        debug!(
            target: DISPATCH_TARGET,
            method = request.method.as_str(),
            id = %request.id,
            "dispatching request"
        );
        match self.call(&request.method, request.params) {
            Ok(result) => {
                debug!(
                    target: DISPATCH_TARGET,
                    method = request.method.as_str(),
                    elapsed_ms = elapsed_ms(started),
                    "request completed"
                );
                ResponseEnvelope::success(request.id, result)
            }
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    method = request.method.as_str(),
                    code = error.code(),
                    elapsed_ms = elapsed_ms(started),
                    %error,
                    "request failed"
                );
                ResponseEnvelope::failure(request.id, &error)
            }
        }
    }
}

fn route_for(entry: &HandlerEntry, affinity_thread: Option<ThreadId>) -> Route {
    match (entry.affinity(), affinity_thread) {
        (Affinity::Any, _) | (Affinity::Host, None) => Route::Inline,
        (Affinity::Host, Some(id)) if id == thread::current().id() => Route::Inline,
        (Affinity::Host, Some(_)) => Route::Queued,
    }
}

fn run_inline(entry: &HandlerEntry, params: Value) -> Result<Value, DispatchError> {
    match panic::catch_unwind(AssertUnwindSafe(|| entry.invoke(params))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(DispatchError::handler(error.message())),
        Err(payload) => Err(DispatchError::handler(format!(
            "handler '{}' panicked: {}",
            entry.name(),
            panic_message(payload.as_ref())
        ))),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
