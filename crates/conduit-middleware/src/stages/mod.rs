//! Built-in middleware stages.
//!
//! - [`request_id`] - Resolve, scope and echo the request ID
//! - [`tracing`] - Request span and completion logging

pub mod request_id;
pub mod tracing;

pub use request_id::RequestIdMiddleware;
pub use tracing::TracingMiddleware;
