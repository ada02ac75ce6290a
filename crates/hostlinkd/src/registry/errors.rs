//! Errors raised by the handler registry.

use thiserror::Error;

use super::handler::ModuleError;

/// Errors arising from registry lookups and reloads.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No handler is registered under the requested method.
    #[error("Unknown method: {method}")]
    NotFound {
        /// Method that was looked up.
        method: String,
    },

    /// A module failed to produce its bindings.
    #[error("handler module '{module}' failed to load: {source}")]
    ModuleLoad {
        /// Module name.
        module: String,
        /// Failure reported by the module.
        #[source]
        source: ModuleError,
    },

    /// A binding tried to claim the reserved reload method.
    #[error("method '{method}' is reserved")]
    Reserved {
        /// Offending method name.
        method: String,
    },

    /// A writer panicked while holding the registry lock.
    #[error("handler registry lock poisoned")]
    Poisoned,
}
