//! Remote-control bridge for single-threaded host applications.
//!
//! The bridge exposes a host's named operations over a JSON request/response
//! protocol carried on WebSocket text frames. Requests arrive on session
//! threads, but most host APIs may only be touched from one thread, so every
//! handler declares an [`Affinity`]: `any` handlers run immediately on the
//! session side, while `host` handlers are queued and executed when the host
//! calls [`Dispatcher::drain`] from its own thread (typically once per frame
//! or tick). Callers block until their job runs or the call timeout elapses.
//!
//! ## Lifecycle
//!
//! [`bootstrap_with`] loads and validates [`hostlink_config::Config`],
//! installs structured telemetry, and builds the [`HandlerRegistry`] from the
//! built-in `core` module, the optional handler manifest, and any modules the
//! host supplies. [`Bridge::server`] then yields a [`BridgeServer`] whose
//! `start` and `stop` are idempotent.
//!
//! Embedding hosts attach their main thread with
//! [`Dispatcher::attach_affinity_thread`] and call `drain` from their loop.
//! The standalone `hostlinkd` binary has no such loop; it runs a
//! [`HostTicker`] instead when `tick_interval_ms` is configured.
//!
//! ## Hot reload
//!
//! The reserved `reload_handlers` method re-derives the whole method table
//! from the registry's modules and swaps it in atomically. A module that
//! fails leaves the previous table in service.

mod affinity;
mod bootstrap;
mod builtins;
mod call_cli;
mod client;
mod dispatch;
mod health;
mod process;
mod registry;
mod server;
mod telemetry;
mod ticker;
mod transport;

pub use affinity::{AffinityError, AffinityQueue, DrainReport, Ticket};
pub use bootstrap::{
    BootstrapError, Bridge, ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use builtins::{CoreModule, core_catalog, default_modules};
pub use call_cli::run as run_call;
pub use client::{BridgeClient, ClientError};
pub use dispatch::{
    DispatchError, Dispatcher, DispatcherOptions, ErrorObject, HANDLER_ERROR, METHOD_NOT_FOUND,
    Outcome, PARSE_ERROR, RejectedRequest, Request, ResponseEnvelope,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon,
};
pub use registry::{
    Affinity, Handler, HandlerBinding, HandlerCatalog, HandlerEntry, HandlerError, HandlerModule,
    HandlerRegistry, ManifestError, ManifestModule, ModuleError, RELOAD_METHOD, RegistryError,
    ReloadSummary,
};
pub use server::{BridgeServer, SESSION_GRACE, ServerError};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use ticker::HostTicker;
pub use transport::{ListenerError, SessionError};

#[cfg(test)]
mod tests;
