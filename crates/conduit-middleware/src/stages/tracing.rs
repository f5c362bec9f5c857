//! Tracing middleware.
//!
//! Wraps the downstream chain in a `tracing` span so every event emitted
//! while handling the request carries its ID, method and path.
//!
//! ## Span Fields
//!
//! - `request_id` - the request's ID
//! - `method` / `path` - from the normalized request
//! - `protocol` - transport the request came in on
//! - `service` - configured service name

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use tracing::Instrument;

/// Middleware that opens a request span and logs completion.
#[derive(Debug, Clone)]
pub struct TracingMiddleware {
    /// The service name for span attributes.
    service_name: String,
}

impl TracingMiddleware {
    /// Creates a new Tracing middleware.
    ///
    /// # Arguments
    ///
    /// * `service_name` - The name of this service for span attributes
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl Default for TracingMiddleware {
    fn default() -> Self {
        Self::new("unknown")
    }
}

impl Middleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        let span = tracing::info_span!(
            "request",
            service = %self.service_name,
            request_id = %ctx.request_id(),
            method = %ctx.request().method,
            path = %ctx.request().path,
            protocol = %ctx.request().protocol,
        );

        Box::pin(
            async move {
                let result = next.run(ctx).await;
                let status = ctx.response().status.as_u16();
                let duration_ms = ctx.elapsed().as_secs_f64() * 1000.0;
                match &result {
                    Ok(()) => tracing::info!(status, duration_ms, "request completed"),
                    Err(error) => tracing::warn!(
                        status,
                        duration_ms,
                        category = error.category().as_str(),
                        error = %error,
                        "request failed"
                    ),
                }
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;
    use conduit_core::{ConduitError, Request};

    #[tokio::test]
    async fn test_passes_result_through() {
        let middleware = TracingMiddleware::new("orders");
        let ok = handler_fn("ok", |ctx| {
            Box::pin(async move {
                ctx.insert_item("handled", true);
                Ok(())
            })
        });
        let mut ctx = MiddlewareContext::detached(Request::default());
        middleware.invoke(&mut ctx, Next::terminal(&ok)).await.unwrap();
        assert!(ctx.has_item("handled"));

        let failing = handler_fn("fail", |_ctx| {
            Box::pin(async { Err(ConduitError::unauthorized("no token")) })
        });
        let result = middleware.invoke(&mut ctx, Next::terminal(&failing)).await;
        assert!(matches!(result, Err(ConduitError::Unauthorized { .. })));
    }

    #[test]
    fn test_default_service_name() {
        assert_eq!(TracingMiddleware::default().service_name, "unknown");
        assert_eq!(TracingMiddleware::new("x").name(), "tracing");
    }
}
