//! Handler abstractions shared by the registry and the dispatcher.
//!
//! A [`Handler`] is an opaque leaf operation: it receives the request's
//! `params` value and returns a JSON result or a [`HandlerError`] whose
//! message is surfaced verbatim to the remote caller. Handlers are grouped
//! into [`HandlerModule`]s so the registry can re-derive its whole mapping on
//! reload.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure raised by a handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with the message sent to the client.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Message sent to the client.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// A named operation callable by remote clients.
pub trait Handler: Send + Sync + 'static {
    /// Executes the operation with the request's `params`.
    fn call(&self, params: Value) -> Result<Value, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn call(&self, params: Value) -> Result<Value, HandlerError> {
        self(params)
    }
}

/// Thread requirements of a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    /// Must run on the host's affinity thread whenever one is attached.
    #[default]
    Host,
    /// May run on any thread, concurrently with other handlers.
    Any,
}

impl Affinity {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method name bound to a handler, as produced by a [`HandlerModule`].
#[derive(Clone)]
pub struct HandlerBinding {
    pub(crate) name: String,
    pub(crate) affinity: Affinity,
    pub(crate) handler: Arc<dyn Handler>,
}

impl HandlerBinding {
    /// Binds `name` to a handler that requires the affinity thread.
    pub fn host(name: impl Into<String>, handler: impl Handler) -> Self {
        Self::with_affinity(name, Affinity::Host, Arc::new(handler))
    }

    /// Binds `name` to a handler that may run on any thread.
    pub fn any(name: impl Into<String>, handler: impl Handler) -> Self {
        Self::with_affinity(name, Affinity::Any, Arc::new(handler))
    }

    /// Binds `name` to a shared handler with an explicit affinity.
    pub fn with_affinity(
        name: impl Into<String>,
        affinity: Affinity,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            name: name.into(),
            affinity,
            handler,
        }
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Thread requirement.
    #[must_use]
    pub fn affinity(&self) -> Affinity {
        self.affinity
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("name", &self.name)
            .field("affinity", &self.affinity)
            .finish_non_exhaustive()
    }
}

/// Failure reported by a [`HandlerModule`] while producing its bindings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ModuleError {
    message: String,
}

impl ModuleError {
    /// Creates a module error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A named group of handlers that the registry re-derives on every reload.
pub trait HandlerModule: Send + Sync {
    /// Module name used in logs and reload errors.
    fn name(&self) -> &str;

    /// Produces the module's current bindings.
    ///
    /// Called once at registry construction and again on every reload, so
    /// implementations may re-read whatever source defines them.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError`] when the bindings cannot be produced; the
    /// registry then keeps its previous mapping.
    fn load(&self) -> Result<Vec<HandlerBinding>, ModuleError>;
}
