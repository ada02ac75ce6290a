use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address the bridge listener binds and clients connect to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP literal.
    pub host: String,
    /// TCP port; `0` asks the operating system for an ephemeral port.
    pub port: u16,
}

impl Endpoint {
    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the WebSocket URL clients use to reach this endpoint.
    #[must_use]
    pub fn ws_url(&self) -> String {
        if self.host.contains(':') {
            format!("ws://[{}]:{}", self.host, self.port)
        } else {
            format!("ws://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.ws_url())
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    /// Parses `host:port`, `[v6]:port`, or the same forms prefixed by `ws://`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let address = trimmed.strip_prefix("ws://").unwrap_or(trimmed);
        let address = address.trim_end_matches('/');
        let Some((host, port)) = address.rsplit_once(':') else {
            return Err(EndpointParseError::MissingPort(input.to_owned()));
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(EndpointParseError::MissingHost(input.to_owned()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| EndpointParseError::InvalidPort(input.to_owned()))?;
        Ok(Self::new(host, port))
    }
}

/// Errors encountered while parsing an [`Endpoint`] from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointParseError {
    /// Host name was missing.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// No `:port` suffix was present.
    #[error("missing port in '{0}'")]
    MissingPort(String),
    /// Port was not a valid 16-bit number.
    #[error("invalid port in '{0}'")]
    InvalidPort(String),
}
