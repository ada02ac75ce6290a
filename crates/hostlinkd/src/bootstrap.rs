//! Bridge bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use hostlink_config::{Config, ConfigError};

use crate::builtins::default_modules;
use crate::dispatch::{Dispatcher, DispatcherOptions};
use crate::health::HealthReporter;
use crate::registry::{HandlerModule, HandlerRegistry, RegistryError};
use crate::server::BridgeServer;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the bridge configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no layer combination yields a config.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already-resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but holds unusable values.
    #[error("invalid configuration: {source}")]
    Validation {
        /// Validation failure.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A handler module failed during the initial load.
    #[error("failed to build handler registry: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Bridge {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Bridge {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dispatcher shared by the server and the host's affinity thread.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Builds a stopped server for the configured endpoint.
    #[must_use]
    pub fn server(&self) -> BridgeServer {
        BridgeServer::new(
            Arc::clone(&self.dispatcher),
            self.config.endpoint(),
            Arc::clone(&self.reporter),
        )
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the bridge using the supplied collaborators.
///
/// The registry receives the built-in modules for the loaded configuration
/// followed by `extra`, so host-supplied modules win on name clashes.
///
/// # Errors
///
/// Returns [`BootstrapError`] when any stage fails; the reporter is told
/// about the failure before it is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    extra: Vec<Box<dyn HandlerModule>>,
) -> Result<Bridge, BootstrapError> {
    reporter.bootstrap_starting();
    match build(loader, &reporter, extra) {
        Ok(bridge) => {
            reporter.bootstrap_succeeded(&bridge.config);
            Ok(bridge)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn build(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    extra: Vec<Box<dyn HandlerModule>>,
) -> Result<Bridge, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::Validation { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let mut modules = default_modules(&config);
    modules.extend(extra);
    let registry =
        HandlerRegistry::new(modules).map_err(|source| BootstrapError::Registry { source })?;
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        DispatcherOptions::from(&config),
    ));

    Ok(Bridge {
        config,
        dispatcher,
        telemetry,
        reporter: Arc::clone(reporter),
    })
}
