//! # Conduit Middleware
//!
//! Middleware pipeline composition for the Conduit framework.
//!
//! Every request flows through a chain of units. Each unit receives the
//! [`MiddlewareContext`] and a [`Next`] continuation, may act before and
//! after calling it, and may skip it entirely to short-circuit.
//!
//! ```text
//! ctx ─► U1 ─► U2 ─► U3 ─► handler
//!        ◄──── ◄──── ◄────
//! ```
//!
//! ## Building blocks
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`Middleware`] | The single unit trait |
//! | [`from_fn`] / [`handler_fn`] | Closures as units |
//! | [`PipelineBuilder`] / [`Pipeline`] | Ordered composition |
//! | [`combinators`] | Branching, fan-out, retry, timeout, error boundaries |
//! | [`stages`] | Built-in request ID and tracing units |
//!
//! ## Example
//!
//! ```
//! use conduit_middleware::combinators::wrap_errors;
//! use conduit_middleware::stages::RequestIdMiddleware;
//! use conduit_middleware::{handler_fn, Pipeline};
//! use conduit_middleware::context::MiddlewareContext;
//! use conduit_core::{ConduitError, Request};
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::builder()
//!     .use_middleware(RequestIdMiddleware::new())
//!     .use_middleware(wrap_errors(|error, ctx| {
//!         ctx.response_mut().set_status(error.status_code());
//!         Ok(())
//!     }))
//!     .build();
//!
//! let handler = handler_fn("missing", |_ctx| {
//!     Box::pin(async { Err(ConduitError::not_found("no such order")) })
//! });
//!
//! let mut ctx = MiddlewareContext::detached(Request::default());
//! pipeline.execute(&mut ctx, &handler).await.unwrap();
//! assert_eq!(ctx.response().status, http::StatusCode::NOT_FOUND);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod combinators;
pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;

// Re-export main types at crate root
pub use context::MiddlewareContext;
pub use middleware::{
    boxed, from_fn, handler_fn, BoxFuture, BoxedMiddleware, FnMiddleware, HandlerFn, Middleware,
    MiddlewareResult, Next,
};
pub use pipeline::{Pipeline, PipelineBuilder};
