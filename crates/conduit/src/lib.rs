//! # Conduit
//!
//! **Middleware pipelines with ambient request context**
//!
//! - **Ambient scopes** – Per-request values and cancellation that follow the
//!   request across every `await`, timer and spawned task
//! - **Onion pipelines** – Ordered units with before/after phases and
//!   short-circuiting
//! - **Combinators** – Branching, fan-out, retry, timeouts and error boundaries
//! - **Host** – Lifecycle hooks, background services and graceful shutdown
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("conduit.toml")?
//!         .with_env_prefix("CONDUIT")
//!         .load()?;
//!
//!     let pipeline = Pipeline::builder()
//!         .use_middleware(RequestIdMiddleware::new())
//!         .use_middleware(TracingMiddleware::new(&config.host.service_name))
//!         .use_middleware(wrap_errors(|error, ctx| {
//!             ctx.response_mut().set_status(error.status_code());
//!             Ok(())
//!         }))
//!         .build();
//!
//!     let app = Application::builder()
//!         .config(config.host.clone())
//!         .pipeline(pipeline)
//!         .handler(handler_fn("hello", |ctx| Box::pin(async move { Ok(()) })))
//!         .build()?;
//!
//!     app.run_until(ShutdownSignal::with_ctrl_c().recv()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → RequestId → Tracing → ... user units ... → Handler
//!                                                          ↓
//! Response ←───────────── after phases, reverse order ─────┘
//! ```

#![doc(html_root_url = "https://docs.rs/conduit/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use conduit_core as core;

// Re-export middleware types
pub use conduit_middleware as middleware;

// Re-export configuration types
pub use conduit_config as config;

// Re-export telemetry types
pub use conduit_telemetry as telemetry;

// Re-export host types
pub use conduit_host as host;

// Ambient scope API
pub use conduit_core::context;

/// Prelude module for convenient imports.
///
/// ```rust
/// use conduit::prelude::*;
/// ```
pub mod prelude {
    pub use conduit_core::context::{self, Scope, ScopeValues};
    pub use conduit_core::{
        ConduitError, ConduitResult, ErrorCategory, EventBuffer, EventPublisher, Protocol,
        Request, RequestId, Response, TransactionOutcome,
    };

    pub use conduit_middleware::combinators::{
        branch, compose, for_methods, for_paths, parallel, with_retry, with_timeout, wrap_errors,
        wrap_errors_async,
        PathPattern, RetryPolicy,
    };
    pub use conduit_middleware::stages::{RequestIdMiddleware, TracingMiddleware};
    pub use conduit_middleware::{
        from_fn, handler_fn, BoxFuture, Middleware, MiddlewareContext, MiddlewareResult, Next,
        Pipeline, PipelineBuilder,
    };

    pub use conduit_config::{ConduitConfig, ConfigError, ConfigLoader};

    pub use conduit_telemetry::{init_telemetry, LogConfig};

    pub use conduit_host::{
        service_fn, Application, BackgroundService, Lifecycle, LifecycleError, ShutdownSignal,
    };
}
