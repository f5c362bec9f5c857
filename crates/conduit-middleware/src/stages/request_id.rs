//! Request ID middleware.
//!
//! Assigns every unit of work a request ID, publishes it in the ambient
//! scope so code far from the pipeline can log it, and echoes it to the
//! caller.
//!
//! ## Request ID Sources
//!
//! 1. **X-Request-ID header**: used when incoming IDs are trusted and the
//!    value is a valid UUID
//! 2. **The request's own ID**: assigned by the adapter (UUID v7)

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use conduit_core::RequestId;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The scope key the request ID is stored under.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Middleware that resolves and propagates request IDs.
///
/// # Behavior
///
/// 1. If trusted, take a valid `X-Request-ID` header as the request's ID
/// 2. Store the ID in the scope under [`REQUEST_ID_KEY`]
/// 3. After downstream completes, success or not, set `X-Request-ID` on the
///    response
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    /// Whether to trust incoming request ID headers.
    ///
    /// Typically `false` for external traffic and `true` for internal
    /// service-to-service calls.
    trust_incoming: bool,
}

impl RequestIdMiddleware {
    /// Creates a middleware that ignores incoming request IDs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a middleware that trusts incoming `X-Request-ID` headers.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    fn incoming(&self, ctx: &MiddlewareContext) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }
        ctx.request()
            .header(REQUEST_ID_HEADER)
            .and_then(RequestId::parse)
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            if let Some(incoming) = self.incoming(ctx) {
                ctx.request_mut().id = incoming;
            }
            let request_id = ctx.request_id();
            ctx.scope().set(REQUEST_ID_KEY, request_id);

            let result = next.run(ctx).await;

            ctx.response_mut()
                .set_header(REQUEST_ID_HEADER, &request_id.to_string());
            result
        })
    }
}
