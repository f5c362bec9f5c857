//! Error boundary combinator.

use super::metric_names;
use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use conduit_core::ConduitError;

type SyncHandler = dyn Fn(ConduitError, &mut MiddlewareContext) -> MiddlewareResult + Send + Sync;

type AsyncHandler = dyn for<'c> Fn(ConduitError, &'c mut MiddlewareContext) -> BoxFuture<'c, MiddlewareResult>
    + Send
    + Sync;

enum ErrorHandler {
    Sync(Box<SyncHandler>),
    Async(Box<AsyncHandler>),
}

/// An error boundary around the downstream chain.
///
/// Created by [`wrap_errors`] or [`wrap_errors_async`].
pub struct ErrorBoundary {
    handler: ErrorHandler,
}

/// Runs the continuation and hands any error to `handler` instead of
/// propagating it.
///
/// The handler may write a failure response and return `Ok(())`, or return an
/// error to propagate further out.
///
/// # Example
///
/// ```
/// use conduit_middleware::combinators::wrap_errors;
///
/// let boundary = wrap_errors(|error, ctx| {
///     ctx.response_mut()
///         .set_status(error.status_code())
///         .set_body(serde_json::json!({ "error": error.category().as_str() }));
///     Ok(())
/// });
/// ```
pub fn wrap_errors<F>(handler: F) -> ErrorBoundary
where
    F: Fn(ConduitError, &mut MiddlewareContext) -> MiddlewareResult + Send + Sync + 'static,
{
    ErrorBoundary {
        handler: ErrorHandler::Sync(Box::new(handler)),
    }
}

/// Like [`wrap_errors`], for handlers that need to await something, such as
/// reporting the error to another service before rendering it.
///
/// # Example
///
/// ```
/// use conduit_middleware::combinators::wrap_errors_async;
///
/// let boundary = wrap_errors_async(|error, ctx| {
///     Box::pin(async move {
///         tokio::task::yield_now().await;
///         ctx.response_mut().set_status(error.status_code());
///         Ok(())
///     })
/// });
/// ```
pub fn wrap_errors_async<F>(handler: F) -> ErrorBoundary
where
    F: for<'c> Fn(ConduitError, &'c mut MiddlewareContext) -> BoxFuture<'c, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    ErrorBoundary {
        handler: ErrorHandler::Async(Box::new(handler)),
    }
}

impl Middleware for ErrorBoundary {
    fn name(&self) -> &'static str {
        "wrap-errors"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            match next.run(ctx).await {
                Ok(()) => Ok(()),
                Err(error) => {
                    let category = error.category().as_str();
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        category,
                        error = %error,
                        "error boundary caught error"
                    );
                    metrics::counter!(metric_names::ERROR_BOUNDARY_CATCHES, "category" => category)
                        .increment(1);
                    match &self.handler {
                        ErrorHandler::Sync(handler) => handler(error, ctx),
                        ErrorHandler::Async(handler) => handler(error, ctx).await,
                    }
                }
            }
        })
    }
}
