//! Connection handling abstraction for the listener.

use std::net::{SocketAddr, TcpStream};

/// Handles accepted TCP connections.
///
/// The listener calls [`ConnectionHandler::handle`] on a dedicated thread per
/// connection, so implementations may block for the connection's lifetime.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream, peer: SocketAddr);
}
