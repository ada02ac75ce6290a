//! TCP listener and WebSocket sessions for the bridge endpoint.
//!
//! The transport module binds the configured endpoint, accepts connections in
//! a background thread, and runs one [`ConnectionSession`] thread per client.

mod errors;
mod handler;
mod listener;
mod session;
#[cfg(test)]
mod test_utils;

pub use self::errors::{ListenerError, SessionError};
pub(crate) use self::handler::ConnectionHandler;
pub(crate) use self::listener::{ListenerHandle, SocketListener};
pub(crate) use self::session::ConnectionSession;
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
