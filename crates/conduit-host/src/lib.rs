//! # Conduit Host
//!
//! Runs a Conduit pipeline as an application: one root scope, one child
//! scope per unit of work, lifecycle hooks, background services and
//! graceful shutdown.
//!
//! ```text
//! start:    startup hooks (in order) ─► spawn services in root scope
//! handle:   child scope ─► pipeline ─► terminal handler ─► response
//! shutdown: cancel root ─► await services (bounded) ─► shutdown hooks (reverse)
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-host/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod application;
pub mod lifecycle;
pub mod service;
pub mod shutdown;

pub use application::{Application, ApplicationBuilder, SERVICE_NAME_KEY};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleHook, LifecycleResult};
pub use service::{service_fn, BackgroundService, ServiceFn};
pub use shutdown::{ShutdownReceiver, ShutdownSignal};
