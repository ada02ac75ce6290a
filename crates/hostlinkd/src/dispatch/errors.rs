//! Error types for request dispatch failures.
//!
//! Every variant maps onto one of the three wire error codes. The display
//! text is the `message` sent to the client, so handler failures pass through
//! verbatim.

use std::time::Duration;

use thiserror::Error;

use crate::affinity::AffinityError;
use crate::registry::RegistryError;

/// Wire code for malformed request envelopes.
pub const PARSE_ERROR: i64 = -32700;
/// Wire code for methods absent from the registry.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Wire code for every failure raised while running a handler.
pub const HANDLER_ERROR: i64 = -32000;

/// Errors surfaced while parsing, routing, or running a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The message was not a JSON object.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// No handler is registered for the method.
    #[error("Unknown method: {method}")]
    MethodNotFound { method: String },

    /// The handler raised an error; its message is passed through verbatim.
    #[error("{message}")]
    Handler { message: String },

    /// The affinity thread did not finish the job within the bound.
    #[error("Timeout after {}ms waiting for '{method}'", .timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    /// The affinity queue was full.
    #[error("Server busy: {message}")]
    Busy { message: String },

    /// The affinity thread went away before the job ran.
    #[error("Affinity thread unavailable: {message}")]
    Detached { message: String },

    /// Internal failure (e.g., lock poisoned).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Returns the wire error code for this error.
    ///
    /// Envelope and routing problems keep their own codes; everything raised
    /// at or after handler invocation shares [`HANDLER_ERROR`].
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::Handler { .. }
            | Self::Timeout { .. }
            | Self::Busy { .. }
            | Self::Detached { .. }
            | Self::Internal { .. } => HANDLER_ERROR,
        }
    }

    /// Creates a parse error from a serde error.
    pub fn from_json_error(source: &serde_json::Error) -> Self {
        Self::parse(source.to_string())
    }

    /// Creates a parse error with a custom message.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a method-not-found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Creates a handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<RegistryError> for DispatchError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound { method } => Self::MethodNotFound { method },
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<AffinityError> for DispatchError {
    fn from(error: AffinityError) -> Self {
        match error {
            AffinityError::Handler(source) => Self::handler(source.message()),
            AffinityError::Timeout { method, timeout } => Self::Timeout { method, timeout },
            error @ AffinityError::QueueFull { .. } => Self::Busy {
                message: error.to_string(),
            },
            error @ AffinityError::Detached { .. } => Self::Detached {
                message: error.to_string(),
            },
            error @ (AffinityError::Panicked { .. } | AffinityError::Abandoned { .. }) => {
                Self::handler(error.to_string())
            }
        }
    }
}
