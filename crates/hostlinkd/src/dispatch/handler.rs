//! Connection handler that runs a dispatch session per client.
//!
//! [`DispatchConnectionHandler`] plugs the dispatcher into the transport
//! layer: every accepted connection becomes a [`ConnectionSession`] whose
//! messages are answered by the shared [`Dispatcher`]. The handler also keeps
//! the count of live sessions so the server can wait for them on shutdown.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ConnectionSession};

use super::dispatcher::{DISPATCH_TARGET, Dispatcher};

/// Connection handler that serves bridge sessions.
#[derive(Debug)]
pub(crate) struct DispatchConnectionHandler {
    dispatcher: Arc<Dispatcher>,
    closing: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl DispatchConnectionHandler {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            closing: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of sessions currently open.
    pub(crate) fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Asks every open session to close and waits up to `grace` for them.
    ///
    /// Returns `true` when all sessions finished in time.
    pub(crate) fn close_sessions(&self, grace: Duration) -> bool {
        self.closing.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + grace;
        while self.active_sessions() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    target: DISPATCH_TARGET,
                    remaining = self.active_sessions(),
                    "sessions still open after shutdown grace period"
                );
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        if self.closing.load(Ordering::SeqCst) {
            debug!(target: DISPATCH_TARGET, %peer, "refusing connection during shutdown");
            return;
        }
        let _guard = SessionGuard::enter(&self.active);
        let session =
            ConnectionSession::new(peer, Arc::clone(&self.dispatcher), Arc::clone(&self.closing));
        if let Err(error) = session.run(stream) {
            warn!(target: DISPATCH_TARGET, %peer, %error, "session ended with error");
        }
    }
}

/// Keeps the live-session count accurate even if a session panics.
struct SessionGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> SessionGuard<'a> {
    fn enter(active: &'a AtomicUsize) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
