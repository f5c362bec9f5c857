//! Observability for Conduit.
//!
//! - **Logging**: structured JSON or pretty output through `tracing-subscriber`
//! - **Metrics**: request counters, latency and in-flight gauges through the
//!   `metrics` facade
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_config::ConduitConfig;
//! use conduit_telemetry::{init_telemetry, LogConfig};
//!
//! let config = ConduitConfig::production();
//! init_telemetry(&LogConfig::from_config(&config.logging, &config.host.service_name))?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging and registers metric descriptions.
///
/// # Errors
///
/// Returns `TelemetryError` if the logging subscriber cannot be installed.
pub fn init_telemetry(config: &LogConfig) -> TelemetryResult<()> {
    init_logging(config)?;
    metrics::describe_metrics();
    Ok(())
}
