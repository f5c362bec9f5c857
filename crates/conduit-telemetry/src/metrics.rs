//! Request metrics for Conduit hosts.
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding process. Without a recorder every call is a no-op.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `conduit_requests_total` | Counter | `protocol`, `status` | Completed units of work |
//! | `conduit_request_duration_seconds` | Histogram | `protocol` | Pipeline latency |
//! | `conduit_in_flight_requests` | Gauge | - | Units of work in progress |
//! | `conduit_unhandled_errors_total` | Counter | `category` | Errors that reached the host |
//! | `conduit_background_services` | Gauge | - | Running background services |

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Completed units of work.
    pub const REQUESTS_TOTAL: &str = "conduit_requests_total";
    /// Pipeline latency.
    pub const REQUEST_DURATION: &str = "conduit_request_duration_seconds";
    /// Units of work in progress.
    pub const IN_FLIGHT: &str = "conduit_in_flight_requests";
    /// Errors that escaped every boundary.
    pub const UNHANDLED_ERRORS: &str = "conduit_unhandled_errors_total";
    /// Running background services.
    pub const BACKGROUND_SERVICES: &str = "conduit_background_services";
}

/// Registers descriptions for the standard metrics with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(names::REQUESTS_TOTAL, "Total number of units of work processed");
    describe_histogram!(
        names::REQUEST_DURATION,
        "Time spent in the middleware pipeline in seconds"
    );
    describe_gauge!(names::IN_FLIGHT, "Units of work currently being processed");
    describe_counter!(
        names::UNHANDLED_ERRORS,
        "Errors not handled by any error boundary"
    );
    describe_gauge!(names::BACKGROUND_SERVICES, "Background services currently running");
}

/// Records a completed unit of work.
pub fn record_request(protocol: &str, status_code: u16, duration: Duration) {
    counter!(
        names::REQUESTS_TOTAL,
        "protocol" => protocol.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(names::REQUEST_DURATION, "protocol" => protocol.to_string())
        .record(duration.as_secs_f64());
}

/// Records an error that reached the host unhandled.
pub fn record_unhandled_error(category: &'static str) {
    counter!(names::UNHANDLED_ERRORS, "category" => category).increment(1);
}

/// Increments the in-flight gauge.
pub fn increment_in_flight() {
    gauge!(names::IN_FLIGHT).increment(1.0);
}

/// Decrements the in-flight gauge.
pub fn decrement_in_flight() {
    gauge!(names::IN_FLIGHT).decrement(1.0);
}

/// Sets the number of running background services.
pub fn set_background_services(count: usize) {
    gauge!(names::BACKGROUND_SERVICES).set(count as f64);
}

/// Holds the in-flight gauge up for as long as it lives.
///
/// ```
/// use conduit_telemetry::metrics::InFlightGuard;
///
/// {
///     let _guard = InFlightGuard::new();
///     // handle the request
/// }
/// ```
#[derive(Debug)]
#[must_use = "the gauge drops as soon as the guard does"]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge; it is decremented on drop.
    pub fn new() -> Self {
        increment_in_flight();
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        decrement_in_flight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_request("http", 200, Duration::from_millis(12));
        record_unhandled_error("internal");
        set_background_services(2);
        let guard = InFlightGuard::new();
        drop(guard);
    }

    #[test]
    fn test_metric_names_share_prefix() {
        for name in [
            names::REQUESTS_TOTAL,
            names::REQUEST_DURATION,
            names::IN_FLIGHT,
            names::UNHANDLED_ERRORS,
            names::BACKGROUND_SERVICES,
        ] {
            assert!(name.starts_with("conduit_"));
        }
    }
}
