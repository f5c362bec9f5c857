//! Request-time routing combinators.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, MiddlewareResult, Next};
use regex::Regex;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&MiddlewareContext) -> bool + Send + Sync>;

/// Chooses between two units per request.
///
/// Created by [`branch`].
pub struct Branch {
    predicate: Predicate,
    if_true: BoxedMiddleware,
    if_false: Option<BoxedMiddleware>,
}

/// Runs `if_true` when `predicate` holds for the request.
///
/// The predicate is evaluated on every request. Without an
/// [`otherwise`](Branch::otherwise) unit, a false predicate goes straight to
/// the continuation.
///
/// # Example
///
/// ```
/// use conduit_middleware::combinators::branch;
/// use conduit_middleware::from_fn;
/// use http::Method;
///
/// let reads = from_fn("reads", |ctx, next| next.run(ctx));
/// let writes = from_fn("writes", |ctx, next| next.run(ctx));
///
/// let unit = branch(|ctx| ctx.request().method == Method::GET, reads).otherwise(writes);
/// ```
pub fn branch<P, M>(predicate: P, if_true: M) -> Branch
where
    P: Fn(&MiddlewareContext) -> bool + Send + Sync + 'static,
    M: Middleware,
{
    Branch {
        predicate: Arc::new(predicate),
        if_true: Arc::new(if_true),
        if_false: None,
    }
}

impl Branch {
    /// Sets the unit run when the predicate is false.
    pub fn otherwise<M: Middleware>(mut self, if_false: M) -> Self {
        self.if_false = Some(Arc::new(if_false));
        self
    }
}

impl Middleware for Branch {
    fn name(&self) -> &'static str {
        "branch"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        if (self.predicate)(&*ctx) {
            tracing::debug!(unit = self.if_true.name(), "branch taken");
            self.if_true.invoke(ctx, next)
        } else if let Some(if_false) = &self.if_false {
            tracing::debug!(unit = if_false.name(), "branch not taken, using alternative");
            if_false.invoke(ctx, next)
        } else {
            next.run(ctx)
        }
    }
}

/// Runs a unit only for some request methods.
///
/// Created by [`for_methods`].
pub struct ForMethods {
    methods: Vec<String>,
    unit: BoxedMiddleware,
}

/// Runs `unit` only when the request method is one of `methods`.
///
/// Matching is case-insensitive. Other requests go straight to the
/// continuation.
pub fn for_methods<I, S, M>(methods: I, unit: M) -> ForMethods
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    M: Middleware,
{
    ForMethods {
        methods: methods
            .into_iter()
            .map(|m| m.as_ref().to_ascii_uppercase())
            .collect(),
        unit: Arc::new(unit),
    }
}

impl ForMethods {
    fn matches(&self, method: &str) -> bool {
        self.methods
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(method))
    }
}

impl Middleware for ForMethods {
    fn name(&self) -> &'static str {
        "for-methods"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        if self.matches(ctx.request().method.as_str()) {
            self.unit.invoke(ctx, next)
        } else {
            next.run(ctx)
        }
    }
}

/// Which paths a [`for_paths`] unit applies to.
#[derive(Clone)]
pub enum PathPattern {
    /// Any path starting with one of these prefixes.
    Prefixes(Vec<String>),
    /// Any path matching this expression.
    Regex(Regex),
    /// Any path the closure accepts.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl PathPattern {
    /// Matches paths starting with any of `prefixes`.
    pub fn prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Prefixes(prefixes.into_iter().map(Into::into).collect())
    }

    /// Matches paths against a regular expression.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Regex)
    }

    /// Matches paths the closure accepts.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Returns `true` if `path` matches.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefixes(prefixes) => prefixes.iter().any(|p| path.starts_with(p.as_str())),
            Self::Regex(regex) => regex.is_match(path),
            Self::Predicate(f) => f(path),
        }
    }
}

impl From<Regex> for PathPattern {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

impl std::fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefixes(prefixes) => f.debug_tuple("Prefixes").field(prefixes).finish(),
            Self::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Runs a unit only for some paths.
///
/// Created by [`for_paths`].
pub struct ForPaths {
    pattern: PathPattern,
    unit: BoxedMiddleware,
}

/// Runs `unit` only when the request path matches `pattern`.
///
/// # Example
///
/// ```
/// use conduit_middleware::combinators::{for_paths, PathPattern};
/// use conduit_middleware::from_fn;
///
/// let admin_only = for_paths(
///     PathPattern::prefixes(["/admin", "/internal"]),
///     from_fn("audit", |ctx, next| next.run(ctx)),
/// );
/// ```
pub fn for_paths<M: Middleware>(pattern: PathPattern, unit: M) -> ForPaths {
    ForPaths {
        pattern,
        unit: Arc::new(unit),
    }
}

impl Middleware for ForPaths {
    fn name(&self) -> &'static str {
        "for-paths"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        if self.pattern.matches(&ctx.request().path) {
            self.unit.invoke(ctx, next)
        } else {
            next.run(ctx)
        }
    }
}
