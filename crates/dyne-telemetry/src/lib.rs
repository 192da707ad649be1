//! Observability for dyne services.
//!
//! - **Logging**: a `tracing-subscriber` registry with an `EnvFilter` and JSON
//!   or pretty output, configured by [`LogConfig`].
//! - **Metrics**: request, auth and stream counters recorded through the
//!   `metrics` facade. Exporters are the application's choice.
//!
//! Client faults are logged at `debug`/`info`; server defects at `error` with
//! `fault = "server"` (see [`logging::fields::FAULT`]).

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::StreamGuard;

/// Result type for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
