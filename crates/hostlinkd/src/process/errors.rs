//! Defines the error surface for running the bridge process.

use std::io;

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::server::ServerError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the bridge process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the bridge failed.
    #[error("bridge bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// The WebSocket server could not start.
    #[error("bridge server failed: {source}")]
    Server {
        /// Underlying server error.
        #[source]
        source: ServerError,
    },
    /// The affinity ticker thread could not be spawned.
    #[error("failed to spawn affinity ticker: {source}")]
    Ticker {
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ServerError> for LaunchError {
    fn from(source: ServerError) -> Self {
        Self::Server { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
