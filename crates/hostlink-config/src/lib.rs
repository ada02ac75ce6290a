//! Layered configuration shared by the hostlink bridge and its tools.
//!
//! Values resolve in increasing precedence from built-in defaults, a TOML
//! file (`--config-path` or `HOSTLINK_CONFIG_PATH`), `HOSTLINK_*` environment
//! variables, and finally command-line flags. Loading is delegated to
//! `ortho_config`; this crate owns the schema, the defaults, and the semantic
//! validation applied after the layers merge.

mod defaults;
mod endpoint;

use std::path::Path;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_PORT,
    default_call_timeout_ms, default_host, default_log_filter, default_log_format, default_port,
};
pub use endpoint::{Endpoint, EndpointParseError};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Resolved bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "HOSTLINK")]
#[serde(default)]
pub struct Config {
    /// Host the listener binds.
    #[ortho_config(default = default_host().to_owned())]
    pub host: String,
    /// Port the listener binds.
    #[ortho_config(default = default_port())]
    pub port: u16,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter().to_owned())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// How long a caller waits for an affinity job before giving up.
    #[ortho_config(default = default_call_timeout_ms())]
    pub call_timeout_ms: u64,
    /// Maximum number of queued affinity jobs; unbounded when unset.
    pub queue_capacity: Option<usize>,
    /// When set, the daemon drives its own affinity ticker at this interval.
    pub tick_interval_ms: Option<u64>,
    /// JSON manifest that selects catalogued handlers; re-read on reload.
    pub handler_manifest: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host().to_owned(),
            port: default_port(),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
            call_timeout_ms: default_call_timeout_ms(),
            queue_capacity: None,
            tick_interval_ms: None,
            handler_manifest: None,
        }
    }
}

impl Config {
    /// Endpoint the listener binds.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Affinity wait bound.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Queue bound, if any.
    #[must_use]
    pub fn queue_capacity(&self) -> Option<usize> {
        self.queue_capacity
    }

    /// Interval for the daemon-driven affinity ticker, if enabled.
    #[must_use]
    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms.map(Duration::from_millis)
    }

    /// Path of the handler manifest, if one is configured.
    #[must_use]
    pub fn handler_manifest(&self) -> Option<&Path> {
        self.handler_manifest.as_deref().map(Path::new)
    }

    /// Rejects values that merge cleanly but cannot drive a running bridge.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the host is blank or a timeout, capacity,
    /// or tick interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.tick_interval_ms == Some(0) {
            return Err(ConfigError::ZeroTickInterval);
        }
        Ok(())
    }
}

/// Semantic configuration errors detected after loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The listener host was blank.
    #[error("listener host must not be empty")]
    EmptyHost,
    /// `call_timeout_ms` was zero.
    #[error("call_timeout_ms must be greater than zero")]
    ZeroTimeout,
    /// `queue_capacity` was zero, which would reject every affinity call.
    #[error("queue_capacity must be greater than zero when set")]
    ZeroCapacity,
    /// `tick_interval_ms` was zero.
    #[error("tick_interval_ms must be greater than zero when set")]
    ZeroTickInterval,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_editor_bridge() {
        let config = Config::default();
        assert_eq!(config.endpoint(), Endpoint::new("localhost", 9877));
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.queue_capacity(), None);
        assert_eq!(config.tick_interval(), None);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_defaults_from_program_name_alone() {
        let config = Config::load_from_iter(["hostlinkd"]).expect("load without layers");
        assert_eq!(config.endpoint(), Endpoint::new(DEFAULT_HOST, DEFAULT_PORT));
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.call_timeout(), Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS));
        assert_eq!(config.queue_capacity(), None);
        assert_eq!(config.tick_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_flag_keeps_remaining_defaults() {
        let config =
            Config::load_from_iter(["hostlinkd", "--port", "9000"]).expect("load with port");
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.call_timeout_ms, DEFAULT_CALL_TIMEOUT_MS);
    }

    #[rstest]
    #[case::json("json", LogFormat::Json)]
    #[case::compact("COMPACT", LogFormat::Compact)]
    fn log_format_parses_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().expect("parse"), expected);
    }

    #[rstest]
    #[case::blank_host(Config { host: "  ".into(), ..Config::default() }, ConfigError::EmptyHost)]
    #[case::zero_timeout(Config { call_timeout_ms: 0, ..Config::default() }, ConfigError::ZeroTimeout)]
    #[case::zero_capacity(Config { queue_capacity: Some(0), ..Config::default() }, ConfigError::ZeroCapacity)]
    #[case::zero_tick(Config { tick_interval_ms: Some(0), ..Config::default() }, ConfigError::ZeroTickInterval)]
    fn validate_rejects_unusable_values(#[case] config: Config, #[case] expected: ConfigError) {
        assert_eq!(config.validate(), Err(expected));
    }
}
