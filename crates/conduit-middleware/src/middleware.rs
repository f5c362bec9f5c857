//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait every unit implements, and
//! [`Next`], the continuation a unit calls to hand control downstream.
//!
//! Units follow the onion model: code before `next.run(ctx)` runs on the way
//! in, code after it runs on the way out, in reverse order. A unit that never
//! calls its continuation short-circuits everything downstream.
//!
//! # Example
//!
//! ```
//! use conduit_middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
//! use conduit_middleware::context::MiddlewareContext;
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn name(&self) -> &'static str {
//!         "powered-by"
//!     }
//!
//!     fn invoke<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, MiddlewareResult> {
//!         Box::pin(async move {
//!             next.run(ctx).await?;
//!             ctx.response_mut().set_header("x-powered-by", "conduit");
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use crate::context::{ContextState, MiddlewareContext};
use conduit_core::{ConduitError, ConduitResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every unit and continuation resolves to.
pub type MiddlewareResult = ConduitResult<()>;

/// A type-erased middleware that can be stored in a sequence.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The core middleware trait.
///
/// Plain functions adapt to it through [`from_fn`] and [`handler_fn`];
/// stateful units implement it directly. Composed pipelines and every
/// combinator implement it too, so they nest freely.
///
/// # Invariants
///
/// - A unit either calls `next.run()` or short-circuits by not calling it.
/// - Errors from `next.run()` propagate unchanged unless the unit is an
///   explicit error boundary.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this unit.
    ///
    /// This name is used for logging, metrics, and debugging.
    fn name(&self) -> &'static str;

    /// Runs this unit.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The mutable middleware context
    /// * `next` - Continuation invoking everything downstream
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        (**self).invoke(ctx, next)
    }
}

impl<M: Middleware + ?Sized> Middleware for Box<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        (**self).invoke(ctx, next)
    }
}

/// Wraps a unit for storage in a pipeline or combinator.
pub fn boxed<M: Middleware>(middleware: M) -> BoxedMiddleware {
    Arc::new(middleware)
}

/// A continuation call shipped from a unit running on another task.
pub(crate) struct RemoteCall {
    pub(crate) state: ContextState,
    pub(crate) reply: oneshot::Sender<(ContextState, MiddlewareResult)>,
}

/// Continuation to invoke the rest of the pipeline.
///
/// `Next` is cheap to clone. Each clone resumes from the same position, so a
/// unit that runs its continuation twice (for example inside a retry) runs
/// the downstream chain twice.
#[derive(Clone)]
pub struct Next<'a> {
    inner: NextInner<'a>,
}

#[derive(Clone)]
enum NextInner<'a> {
    /// Remaining units of a pipeline, then the pipeline's own continuation.
    Chain {
        units: &'a [BoxedMiddleware],
        then: Arc<Next<'a>>,
    },
    /// A terminal unit, invoked with a no-op continuation.
    Terminal(&'a dyn Middleware),
    /// The real continuation lives on another task.
    Remote(mpsc::UnboundedSender<RemoteCall>),
    /// Nothing downstream.
    Noop,
}

impl<'a> Next<'a> {
    /// A continuation that does nothing and succeeds.
    #[must_use]
    pub const fn noop() -> Self {
        Self {
            inner: NextInner::Noop,
        }
    }

    /// A continuation that invokes `handler` as the end of the chain.
    #[must_use]
    pub fn terminal(handler: &'a dyn Middleware) -> Self {
        Self {
            inner: NextInner::Terminal(handler),
        }
    }

    /// A continuation that walks `units` in order, then runs `then`.
    #[must_use]
    pub fn chain(units: &'a [BoxedMiddleware], then: Next<'a>) -> Self {
        Self::chain_shared(units, Arc::new(then))
    }

    fn chain_shared(units: &'a [BoxedMiddleware], then: Arc<Next<'a>>) -> Self {
        Self {
            inner: NextInner::Chain { units, then },
        }
    }

    pub(crate) fn remote(calls: mpsc::UnboundedSender<RemoteCall>) -> Self {
        Self {
            inner: NextInner::Remote(calls),
        }
    }

    /// Invokes the rest of the pipeline.
    pub fn run<'c>(self, ctx: &'c mut MiddlewareContext) -> BoxFuture<'c, MiddlewareResult>
    where
        'a: 'c,
    {
        match self.inner {
            NextInner::Chain { units, then } => match units.split_first() {
                Some((unit, rest)) => unit.invoke(ctx, Next::chain_shared(rest, then)),
                None => Next::clone(&then).run(ctx),
            },
            NextInner::Terminal(handler) => handler.invoke(ctx, Next::noop()),
            NextInner::Remote(calls) => Box::pin(async move {
                let (reply, response) = oneshot::channel();
                let call = RemoteCall {
                    state: ctx.take_state(),
                    reply,
                };
                if let Err(mpsc::error::SendError(call)) = calls.send(call) {
                    ctx.restore(call.state);
                    return Err(abandoned());
                }
                match response.await {
                    Ok((state, result)) => {
                        ctx.restore(state);
                        result
                    }
                    Err(_) => Err(abandoned()),
                }
            }),
            NextInner::Noop => Box::pin(async { Ok(()) }),
        }
    }
}

fn abandoned() -> ConduitError {
    ConduitError::cancelled("continuation abandoned after deadline")
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            NextInner::Chain { units, .. } => {
                return f
                    .debug_struct("Next")
                    .field("remaining", &units.len())
                    .finish_non_exhaustive()
            }
            NextInner::Terminal(handler) => handler.name(),
            NextInner::Remote(_) => "remote",
            NextInner::Noop => "noop",
        };
        f.debug_tuple("Next").field(&kind).finish()
    }
}

/// A middleware created from a function.
///
/// This allows defining simple middleware without implementing the trait
/// directly.
///
/// # Example
///
/// ```
/// use conduit_middleware::from_fn;
///
/// let timing = from_fn("timing", |ctx, next| {
///     Box::pin(async move {
///         let start = std::time::Instant::now();
///         let result = next.run(ctx).await;
///         tracing::debug!(elapsed = ?start.elapsed(), "downstream finished");
///         result
///     })
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

/// Creates a unit from a function taking the context and the continuation.
pub fn from_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Next<'a>) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    FnMiddleware { name, func }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Next<'a>) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        (self.func)(ctx, next)
    }
}

/// A terminal handler created from a function.
///
/// Handlers end the chain: the continuation they receive is ignored.
pub struct HandlerFn<F> {
    name: &'static str,
    func: F,
}

/// Creates a terminal handler from a function taking only the context.
///
/// # Example
///
/// ```
/// use conduit_middleware::handler_fn;
///
/// let hello = handler_fn("hello", |ctx| {
///     Box::pin(async move {
///         ctx.response_mut().set_body(serde_json::json!({"hello": "world"}));
///         Ok(())
///     })
/// });
/// ```
pub fn handler_fn<F>(name: &'static str, func: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    HandlerFn { name, func }
}

impl<F> Middleware for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        _next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::Request;

    fn ctx() -> MiddlewareContext {
        MiddlewareContext::detached(Request::default())
    }

    #[tokio::test]
    async fn test_noop_succeeds() {
        let mut ctx = ctx();
        assert!(Next::noop().run(&mut ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_from_fn_runs_before_and_after() {
        let unit = from_fn("wrap", |ctx, next| {
            Box::pin(async move {
                ctx.insert_item("before", true);
                next.run(ctx).await?;
                ctx.response_mut().set_header("x-after", "1");
                Ok(())
            })
        });
        let handler = handler_fn("handler", |ctx| {
            Box::pin(async move {
                assert!(ctx.has_item("before"));
                ctx.response_mut().set_body(serde_json::json!("done"));
                Ok(())
            })
        });

        let mut ctx = ctx();
        unit.invoke(&mut ctx, Next::terminal(&handler)).await.unwrap();

        assert_eq!(ctx.response().header("x-after"), Some("1"));
        assert_eq!(ctx.response().body, serde_json::json!("done"));
    }

    #[tokio::test]
    async fn test_next_can_run_twice() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let handler = from_fn("count", move |_ctx, _next| {
            let calls = Arc::clone(&counted);
            Box::pin(async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
        });

        let mut ctx = ctx();
        let next = Next::terminal(&handler);
        next.clone().run(&mut ctx).await.unwrap();
        next.run(&mut ctx).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remote_without_receiver_is_cancelled() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let mut ctx = ctx();
        ctx.insert_item("kept", 1_u8);
        let result = Next::remote(tx).run(&mut ctx).await;

        assert!(matches!(result, Err(ConduitError::Cancelled { .. })));
        assert!(ctx.has_item("kept"));
    }

    #[test]
    fn test_boxed_keeps_name() {
        let unit = boxed(handler_fn("named", |_ctx| Box::pin(async { Ok(()) })));
        assert_eq!(unit.name(), "named");
    }
}
