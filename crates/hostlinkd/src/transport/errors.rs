//! Error types for listener and session operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding or running the TCP listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to read bound listener address: {source}")]
    LocalAddr {
        #[source]
        source: io::Error,
    },
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn listener thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Errors that end a single connection session.
///
/// None of these affect the listener or sibling sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to configure connection socket: {source}")]
    Socket {
        #[source]
        source: io::Error,
    },
    #[error("WebSocket handshake failed: {source}")]
    Handshake {
        #[source]
        source: tungstenite::Error,
    },
    #[error("WebSocket handshake did not complete in time")]
    HandshakeTimeout,
    #[error("WebSocket transport error: {source}")]
    Transport {
        #[source]
        source: tungstenite::Error,
    },
}
