//! Middleware context types.
//!
//! The [`MiddlewareContext`] is the per-request carrier passed explicitly
//! through the pipeline. It pairs the ambient [`Scope`] of the unit of work
//! with the request, the response being built and a bag of request-local
//! items.

use conduit_core::context::Value;
use conduit_core::{Request, RequestId, Response, Scope, ScopeValues};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Request-local items keyed by name.
pub type Items = HashMap<String, Value>;

/// Context that flows through the middleware pipeline.
///
/// `items` live only as long as the context; anything that must survive the
/// request has to be copied out explicitly.
///
/// # Example
///
/// ```
/// use conduit_middleware::context::MiddlewareContext;
/// use conduit_core::Request;
///
/// let mut ctx = MiddlewareContext::detached(Request::default());
/// ctx.insert_item("user_id", 42_u64);
///
/// assert_eq!(ctx.item::<u64>("user_id").as_deref(), Some(&42));
/// assert!(ctx.item::<String>("user_id").is_none());
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// The ambient scope of this unit of work.
    scope: Arc<Scope>,

    /// The normalized request.
    request: Request,

    /// The response being built.
    response: Response,

    /// Pipeline-internal data.
    items: Items,

    /// When the request started processing.
    started_at: Instant,
}

/// The movable part of a context: everything except the scope.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContextState {
    pub(crate) request: Request,
    pub(crate) response: Response,
    pub(crate) items: Items,
}

impl MiddlewareContext {
    /// Creates a context for `request` in `scope` with the default 200 response
    /// shell.
    #[must_use]
    pub fn new(scope: Arc<Scope>, request: Request) -> Self {
        Self {
            scope,
            request,
            response: Response::default(),
            items: Items::new(),
            started_at: Instant::now(),
        }
    }

    /// Creates a context in a fresh root scope.
    ///
    /// Useful for tests and for running a pipeline outside an application.
    #[must_use]
    pub fn detached(request: Request) -> Self {
        Self::new(Scope::root(ScopeValues::new()), request)
    }

    /// Replaces the response shell.
    #[must_use]
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = response;
        self
    }

    /// Returns the scope of this unit of work.
    #[must_use]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// Returns the request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns a mutable reference to the request.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Returns the response being built.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Returns a mutable reference to the response.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request.id
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Inserts a typed item, replacing any previous value.
    pub fn insert_item<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.items.insert(key.into(), Arc::new(value));
    }

    /// Returns a typed item if present with that type.
    #[must_use]
    pub fn item<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.items
            .get(key)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Returns `true` if an item is present.
    #[must_use]
    pub fn has_item(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Removes an item.
    pub fn remove_item(&mut self, key: &str) -> Option<Value> {
        self.items.remove(key)
    }

    /// Returns all items.
    #[must_use]
    pub fn items(&self) -> &Items {
        &self.items
    }

    /// Creates an independent copy sharing the same scope.
    ///
    /// Request, response and items are cloned; item values themselves are
    /// shared through their `Arc`.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            scope: Arc::clone(&self.scope),
            request: self.request.clone(),
            response: self.response.clone(),
            items: self.items.clone(),
            started_at: self.started_at,
        }
    }

    /// Folds the changes a fork made relative to `baseline` into this
    /// context.
    ///
    /// Items the fork inserted or replaced are copied. Response headers the
    /// fork added or changed replace this context's values for that name,
    /// and status and body are taken when the fork changed them. Removals
    /// made by the fork do not affect this context.
    pub(crate) fn merge_fork(&mut self, baseline: &ContextState, fork: Self) {
        for (key, value) in fork.items {
            let unchanged = baseline
                .items
                .get(&key)
                .is_some_and(|original| Arc::ptr_eq(original, &value));
            if !unchanged {
                self.items.insert(key, value);
            }
        }

        let response = fork.response;
        for name in response.headers.keys() {
            let unchanged = response
                .headers
                .get_all(name)
                .iter()
                .eq(baseline.response.headers.get_all(name).iter());
            if unchanged {
                continue;
            }
            self.response.headers.remove(name);
            for value in response.headers.get_all(name) {
                self.response.headers.append(name.clone(), value.clone());
            }
        }
        if response.status != baseline.response.status {
            self.response.status = response.status;
        }
        if response.body != baseline.response.body {
            self.response.body = response.body;
        }
    }

    pub(crate) fn snapshot(&self) -> ContextState {
        ContextState {
            request: self.request.clone(),
            response: self.response.clone(),
            items: self.items.clone(),
        }
    }

    pub(crate) fn take_state(&mut self) -> ContextState {
        ContextState {
            request: std::mem::take(&mut self.request),
            response: std::mem::take(&mut self.response),
            items: std::mem::take(&mut self.items),
        }
    }

    pub(crate) fn restore(&mut self, state: ContextState) {
        self.request = state.request;
        self.response = state.response;
        self.items = state.items;
    }

    /// Consumes the context, returning the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}
