//! Composition combinators.
//!
//! Each combinator wraps one or more units and is itself a [`Middleware`],
//! so combinators nest inside pipelines and inside each other.
//!
//! | Combinator | Behavior |
//! |---|---|
//! | [`compose`] | A fixed list of units as one pipeline |
//! | [`branch`] | Per-request choice between two units |
//! | [`for_methods`] / [`for_paths`] | Run a unit only for matching requests |
//! | [`wrap_errors`] | Error boundary around the downstream chain |
//! | [`parallel`] | Concurrent fan-out, fail fast, then continue |
//! | [`with_retry`] | Re-run a unit on failure |
//! | [`with_timeout`] | Race a unit against a deadline |
//!
//! [`Middleware`]: crate::Middleware

mod errors;
mod parallel;
mod retry;
mod routing;
mod timeout;

pub use errors::{wrap_errors, wrap_errors_async, ErrorBoundary};
pub use parallel::{parallel, Parallel};
pub use retry::{with_retry, RetryPolicy, WithRetry};
pub use routing::{branch, for_methods, for_paths, Branch, ForMethods, ForPaths, PathPattern};
pub use timeout::{with_timeout, WithTimeout};

use crate::middleware::BoxedMiddleware;
use crate::pipeline::{Pipeline, PipelineBuilder};

/// Metric names recorded by the combinators.
pub mod metric_names {
    /// Counter: retries performed, labelled by unit.
    pub const RETRY_ATTEMPTS: &str = "conduit_retry_attempts_total";
    /// Counter: deadlines exceeded, labelled by unit.
    pub const TIMEOUTS: &str = "conduit_timeouts_total";
    /// Counter: errors handled by an error boundary, labelled by category.
    pub const ERROR_BOUNDARY_CATCHES: &str = "conduit_error_boundary_catches_total";
}

/// Builds a pipeline from a fixed list of units.
///
/// # Example
///
/// ```
/// use conduit_middleware::combinators::compose;
/// use conduit_middleware::{boxed, from_fn};
///
/// let pipeline = compose([
///     boxed(from_fn("a", |ctx, next| next.run(ctx))),
///     boxed(from_fn("b", |ctx, next| next.run(ctx))),
/// ]);
/// assert_eq!(pipeline.unit_names(), vec!["a", "b"]);
/// ```
pub fn compose<I>(units: I) -> Pipeline
where
    I: IntoIterator<Item = BoxedMiddleware>,
{
    units
        .into_iter()
        .fold(PipelineBuilder::new(), PipelineBuilder::use_boxed)
        .build()
}
