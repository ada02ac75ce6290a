//! Start/stop control for the bridge endpoint.
//!
//! [`BridgeServer`] owns the listener and the session handler for one
//! endpoint. Both operations are idempotent: starting a running server
//! reports the address it already listens on, and stopping a stopped server
//! does nothing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use hostlink_config::Endpoint;

use crate::dispatch::{DispatchConnectionHandler, Dispatcher};
use crate::health::HealthReporter;
use crate::transport::{ConnectionHandler, ListenerError, ListenerHandle, SocketListener};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// How long `stop` waits for open sessions to wind down.
pub const SESSION_GRACE: Duration = Duration::from_secs(2);

/// Errors surfaced while controlling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound or started.
    #[error("failed to start listener: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

impl From<ListenerError> for ServerError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}

struct Running {
    listener: ListenerHandle,
    sessions: Arc<DispatchConnectionHandler>,
}

/// WebSocket endpoint serving a shared [`Dispatcher`].
pub struct BridgeServer {
    dispatcher: Arc<Dispatcher>,
    endpoint: Endpoint,
    reporter: Arc<dyn HealthReporter>,
    running: Mutex<Option<Running>>,
}

impl BridgeServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        endpoint: Endpoint,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            dispatcher,
            endpoint,
            reporter,
            running: Mutex::new(None),
        }
    }

    /// Dispatcher answering this server's requests.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Endpoint the server binds when started.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Binds the endpoint and begins accepting connections.
    ///
    /// Returns the bound address; when already running, returns the address
    /// in use without rebinding.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listener`] when the endpoint cannot be resolved
    /// or bound, or the accept thread cannot be spawned.
    pub fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut running = self.lock_running();
        if let Some(current) = running.as_ref() {
            let addr = current.listener.local_addr();
            debug!(target: SERVER_TARGET, %addr, "start ignored; already running");
            return Ok(addr);
        }
        let listener = SocketListener::bind(&self.endpoint)?;
        let addr = listener.local_addr();
        let sessions = Arc::new(DispatchConnectionHandler::new(Arc::clone(
            &self.dispatcher,
        )));
        let handler: Arc<dyn ConnectionHandler> = sessions.clone();
        let handle = listener.start(handler)?;
        *running = Some(Running {
            listener: handle,
            sessions,
        });
        drop(running);
        info!(target: SERVER_TARGET, endpoint = %self.endpoint, %addr, "bridge server started");
        self.reporter.server_listening(addr);
        Ok(addr)
    }

    /// Stops accepting, closes open sessions, and releases the port.
    ///
    /// Returns `false` when the server was not running.
    pub fn stop(&self) -> bool {
        let Some(Running { listener, sessions }) = self.lock_running().take() else {
            debug!(target: SERVER_TARGET, "stop ignored; not running");
            return false;
        };
        let addr = listener.local_addr();
        listener.shutdown();
        if let Err(error) = listener.join() {
            warn!(target: SERVER_TARGET, %addr, %error, "listener thread ended abnormally");
        }
        sessions.close_sessions(SESSION_GRACE);
        info!(target: SERVER_TARGET, %addr, "bridge server stopped");
        self.reporter.server_stopped(addr);
        true
    }

    /// Stops the server if running, then starts it again.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the restart fails to bind.
    pub fn restart(&self) -> Result<SocketAddr, ServerError> {
        self.stop();
        self.start()
    }

    /// Address the server listens on, if running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_running()
            .as_ref()
            .map(|running| running.listener.local_addr())
    }

    /// Whether the server is accepting connections.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Number of sessions currently connected.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.lock_running()
            .as_ref()
            .map_or(0, |running| running.sessions.active_sessions())
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServer")
            .field("endpoint", &self.endpoint)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}
