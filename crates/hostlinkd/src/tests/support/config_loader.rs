//! Configuration loaders used by the behavioural suites.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};

use hostlink_config::Config;

use crate::bootstrap::ConfigLoader;

/// Loader that binds an ephemeral loopback port.
#[derive(Debug, Clone)]
pub struct TestConfigLoader {
    config: Config,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config {
                host: String::from("127.0.0.1"),
                port: 0,
                ..Config::default()
            },
        }
    }

    /// Overrides the affinity wait bound.
    #[must_use]
    pub fn with_call_timeout_ms(mut self, call_timeout_ms: u64) -> Self {
        self.config.call_timeout_ms = call_timeout_ms;
        self
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Loader that intentionally fails by passing an unparsable port.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("hostlinkd"),
            OsString::from("--port"),
            OsString::from("not-a-port"),
        ];
        Config::load_from_iter(args)
    }
}
