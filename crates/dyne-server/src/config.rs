//! Server configuration.
//!
//! Settings are built in code with [`ServerConfig::builder()`] or parsed
//! from a TOML fragment supplied by the application:
//!
//! ```rust
//! use dyne_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::from_toml_str(r#"
//!     bind = "127.0.0.1:9000"
//!     request_timeout_ms = 2500
//! "#).unwrap();
//!
//! assert_eq!(config.bind(), "127.0.0.1:9000");
//! assert_eq!(config.request_timeout(), Duration::from_millis(2500));
//! assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ServerError;

/// Listen address used when none is configured.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Default handler timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default request body limit (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Default per-direction message buffer of a stream session.
pub const DEFAULT_STREAM_CHANNEL_CAPACITY: usize = 32;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address, e.g. `"0.0.0.0:8080"`.
    #[serde(default = "default_bind")]
    bind: String,

    /// Upper bound on body collection and on handler execution.
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,

    /// How long shutdown waits for open connections.
    #[serde(default = "default_shutdown_timeout_secs")]
    shutdown_timeout_secs: u64,

    /// Requests with larger bodies are answered with 413.
    #[serde(default = "default_max_body_bytes")]
    max_body_bytes: usize,

    /// Buffered messages per direction for each stream session.
    #[serde(default = "default_stream_channel_capacity")]
    stream_channel_capacity: usize,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_stream_channel_capacity() -> usize {
    DEFAULT_STREAM_CHANNEL_CAPACITY
}

impl ServerConfig {
    /// Starts from the defaults.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Parses a TOML fragment. Missing keys take their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(input).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServerError> {
        if self.stream_channel_capacity == 0 {
            return Err(ServerError::Config("stream_channel_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The bind address as written.
    #[must_use]
    pub fn bind(&self) -> &str {
        &self.bind
    }

    /// Parses the bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        self.bind
            .parse()
            .map_err(|e| ServerError::Bind(format!("invalid address '{}': {e}", self.bind)))
    }

    /// Handler timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Request body limit in bytes.
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Per-direction stream buffer.
    #[must_use]
    pub fn stream_channel_capacity(&self) -> usize {
        self.stream_channel_capacity
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            config: ServerConfig {
                bind: default_bind(),
                request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
                stream_channel_capacity: DEFAULT_STREAM_CHANNEL_CAPACITY,
            },
        }
    }
}

impl ServerConfigBuilder {
    /// Listen address for HTTP and stream connections.
    #[must_use]
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.config.bind = addr.into();
        self
    }

    /// Sets the handler timeout. Sub-millisecond precision is dropped.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the graceful shutdown timeout, in whole seconds.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the body limit.
    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.config.max_body_bytes = limit;
        self
    }

    /// Sets the stream buffer. Zero is raised to one.
    #[must_use]
    pub fn stream_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.stream_channel_capacity = capacity.max(1);
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind(), DEFAULT_BIND);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_body_bytes(), DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.stream_channel_capacity(), DEFAULT_STREAM_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::builder()
            .bind("127.0.0.1:3000")
            .request_timeout(Duration::from_millis(250))
            .shutdown_timeout(Duration::from_secs(5))
            .stream_channel_capacity(0)
            .build();
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.stream_channel_capacity(), 1);
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_toml_defaults_and_errors() {
        let config = ServerConfig::from_toml_str("max_body_bytes = 1024").unwrap();
        assert_eq!(config.max_body_bytes(), 1024);
        assert_eq!(config.bind(), DEFAULT_BIND);

        assert!(matches!(
            ServerConfig::from_toml_str("http_port = 1"),
            Err(ServerError::Config(_))
        ));
        assert!(ServerConfig::from_toml_str("stream_channel_capacity = 0").is_err());
    }

    #[test]
    fn test_bad_addr() {
        let config = ServerConfig::builder().bind("not-an-addr").build();
        assert!(matches!(config.socket_addr(), Err(ServerError::Bind(_))));
    }
}
