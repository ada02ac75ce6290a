//! JSON-RPC style request dispatch.
//!
//! This module turns transport messages into handler calls and handler
//! outcomes into response envelopes. The [`Dispatcher`] owns the registry and
//! the affinity queue; the connection handler wires it into the listener.
//!
//! ## Protocol
//!
//! Each message carries one request:
//!
//! ```json
//! {"id":1,"method":"ping","params":{}}
//! ```
//!
//! and is answered by exactly one response carrying `result` or `error`:
//!
//! ```json
//! {"id":1,"result":{"pong":true}}
//! {"id":1,"error":{"code":-32601,"message":"Unknown method: doesNotExist"}}
//! ```
//!
//! Malformed messages are answered with `"id": null` and code `-32700`;
//! handler failures, timeouts, and a full affinity queue use `-32000`.

mod dispatcher;
mod errors;
mod handler;
mod request;
mod response;

pub use self::dispatcher::{Dispatcher, DispatcherOptions};
pub use self::errors::{DispatchError, HANDLER_ERROR, METHOD_NOT_FOUND, PARSE_ERROR};
pub(crate) use self::handler::DispatchConnectionHandler;
pub use self::request::{RejectedRequest, Request};
pub use self::response::{ErrorObject, Outcome, ResponseEnvelope};
