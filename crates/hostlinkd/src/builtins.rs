//! Handlers that ship with the bridge itself.
//!
//! The `core` module provides `ping` and `echo`, which hosts and clients use
//! to check liveness and round-tripping. The same handlers are exposed in a
//! [`HandlerCatalog`] so a handler manifest can bind them under other names.

use hostlink_config::Config;
use serde_json::{Value, json};

use crate::registry::{
    Affinity, HandlerBinding, HandlerCatalog, HandlerError, HandlerModule, ManifestModule,
    ModuleError,
};

/// Built-in `ping` and `echo` handlers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreModule;

impl HandlerModule for CoreModule {
    fn name(&self) -> &str {
        "core"
    }

    fn load(&self) -> Result<Vec<HandlerBinding>, ModuleError> {
        Ok(vec![
            HandlerBinding::host("ping", ping),
            HandlerBinding::any("echo", echo),
        ])
    }
}

/// Answers `{"pong": true}`; runs on the affinity thread so it also proves
/// the host is ticking.
fn ping(_params: Value) -> Result<Value, HandlerError> {
    Ok(json!({ "pong": true }))
}

/// Returns its parameters unchanged.
fn echo(params: Value) -> Result<Value, HandlerError> {
    Ok(params)
}

/// Catalog of built-in handlers available to manifests.
#[must_use]
pub fn core_catalog() -> HandlerCatalog {
    HandlerCatalog::new()
        .with("ping", Affinity::Host, ping)
        .with("echo", Affinity::Any, echo)
}

/// Modules the daemon registers for `config`: `core`, then the configured
/// manifest, if any.
#[must_use]
pub fn default_modules(config: &Config) -> Vec<Box<dyn HandlerModule>> {
    let mut modules: Vec<Box<dyn HandlerModule>> = vec![Box::new(CoreModule)];
    if let Some(path) = config.handler_manifest() {
        modules.push(Box::new(ManifestModule::new(path, core_catalog())));
    }
    modules
}
