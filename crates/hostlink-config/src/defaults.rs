/// Default listener host, matching the editor-side bridge.
pub const DEFAULT_HOST: &str = "localhost";

/// Default listener port.
pub const DEFAULT_PORT: u16 = 9877;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bound on how long a caller waits for an affinity job, in milliseconds.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default listener host.
pub fn default_host() -> &'static str {
    DEFAULT_HOST
}

/// Default listener port.
pub fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::LogFormat {
    crate::LogFormat::Json
}

/// Default affinity wait bound in milliseconds.
pub fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}
