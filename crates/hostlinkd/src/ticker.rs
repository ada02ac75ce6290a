//! Daemon-owned affinity thread.
//!
//! Embedding hosts drain the dispatcher from their own main loop. The
//! standalone daemon has no such loop, so when `tick_interval_ms` is set it
//! runs a [`HostTicker`]: a dedicated thread that attaches itself as the
//! affinity thread and drains on every tick.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;

const TICKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::ticker");

/// Handle to a running ticker thread; stops the thread when dropped.
#[derive(Debug)]
pub struct HostTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HostTicker {
    /// Spawns the ticker thread and waits until it has attached.
    ///
    /// # Errors
    ///
    /// Returns the spawn error when the thread cannot be created.
    pub fn spawn(dispatcher: Arc<Dispatcher>, interval: Duration) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let handle = thread::Builder::new()
            .name(String::from("hostlink-ticker"))
            .spawn(move || {
                dispatcher.attach_affinity_thread();
                ready_tx.send(()).ok();
                run(&dispatcher, &stop_flag, interval);
            })?;
        // A closed channel means the thread died before attaching; `stop`
        // will surface that through the join.
        ready_rx.recv().ok();
        info!(
            target: TICKER_TARGET,
            interval_ms = interval.as_millis(),
            "affinity ticker started"
        );
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops ticking, detaches the thread, and joins it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: TICKER_TARGET, "affinity ticker panicked");
            } else {
                info!(target: TICKER_TARGET, "affinity ticker stopped");
            }
        }
    }
}

impl Drop for HostTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(dispatcher: &Dispatcher, stop: &AtomicBool, interval: Duration) {
    while !stop.load(Ordering::SeqCst) {
        let report = dispatcher.drain();
        if report.total() > 0 {
            debug!(
                target: TICKER_TARGET,
                executed = report.executed,
                failed = report.failed,
                skipped = report.skipped,
                "tick drained jobs"
            );
        }
        thread::sleep(interval);
    }
    let failed = dispatcher.detach_affinity_thread();
    if failed > 0 {
        debug!(target: TICKER_TARGET, failed, "queued jobs failed on detach");
    }
}
