//! Structured logging setup.
//!
//! Every dyne crate logs through `tracing` with a fixed set of field names
//! (see [`fields`]). This module installs the subscriber that turns those
//! events into output: JSON lines by default, or a human-readable format for
//! development.
//!
//! # Example
//!
//! ```rust,ignore
//! use dyne_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(route = "get_item", status = 200, "request completed");
//! ```

use serde::Deserialize;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event, with the enclosing request span.
    #[default]
    Json,
    /// Multi-line, indented output.
    Pretty,
    /// One short line per event.
    Compact,
}

/// Logging configuration.
///
/// Deserialises from a TOML or JSON fragment; missing keys keep their
/// defaults:
///
/// ```toml
/// filter = "dyne_server=debug,info"
/// format = "pretty"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Install nothing when false.
    pub enabled: bool,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Line format.
    pub format: LogFormat,
    /// Log span open and close, which brackets every request.
    pub span_events: bool,
    /// Attach source file and line.
    pub source_location: bool,
    /// Attach the module path.
    pub targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: "info".to_string(),
            format: LogFormat::Json,
            span_events: false,
            source_location: false,
            targets: true,
        }
    }
}

impl LogConfig {
    /// Pretty output at `debug`, with request spans and source locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            filter: "debug".to_string(),
            format: LogFormat::Pretty,
            span_events: true,
            source_location: true,
            ..Self::default()
        }
    }

    /// JSON output at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Replaces the filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

/// Installs the global subscriber.
///
/// Fails if the filter directive does not parse or a global subscriber is
/// already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let layer = fmt_layer(config).with_filter(parse_filter(&config.filter)?);
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

fn fmt_layer(config: &LogConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = tracing_subscriber::fmt::layer()
        .with_span_events(spans)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_target(config.targets);

    match config.format {
        LogFormat::Json => base.json().with_current_span(true).boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

/// Parses an `EnvFilter` directive such as `"dyne_auth=debug,warn"`.
pub fn parse_filter(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|e| TelemetryError::InvalidFilter {
        filter: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Field names used in dyne log events.
pub mod fields {
    /// Per-request UUID.
    pub const REQUEST_ID: &str = "request_id";

    /// Route name.
    pub const ROUTE: &str = "route";

    /// HTTP method.
    pub const METHOD: &str = "method";

    /// Request path.
    pub const PATH: &str = "path";

    /// Response status code.
    pub const STATUS: &str = "status";

    /// Auth scheme.
    pub const SCHEME: &str = "scheme";

    /// `"client"` or `"server"`, separating bad input from defects.
    pub const FAULT: &str = "fault";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_is_json_at_info() {
        let config = LogConfig::production();
        assert!(config.enabled);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "info");
        assert!(!config.span_events);
    }

    #[test]
    fn test_development_brackets_requests() {
        let config = LogConfig::development().with_filter("dyne_auth=trace");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.span_events && config.source_location);
        assert_eq!(config.filter, "dyne_auth=trace");
    }

    #[test]
    fn test_config_from_toml() {
        let config: LogConfig = toml::from_str("filter = \"warn\"\nformat = \"compact\"").unwrap();
        assert_eq!(config.filter, "warn");
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.targets);

        assert!(toml::from_str::<LogConfig>("level = \"warn\"").is_err());
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let err = parse_filter("dyne=notalevel").unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidFilter { ref filter, .. } if filter == "dyne=notalevel"));
        assert!(parse_filter("dyne_server=debug,info").is_ok());
    }

    #[test]
    fn test_disabled_logging_is_noop() {
        let config = LogConfig {
            enabled: false,
            filter: "not a directive ===".to_string(),
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
