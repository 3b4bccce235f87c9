//! Middleware types for the operation execution pipeline.
//!
//! Middleware wraps a single operation invocation with cross-cutting
//! concerns like validation, metering, logging, and output shaping.
//!
//! Each middleware receives a [`Next`] that it can call to continue the
//! chain, or skip to short-circuit. Composition is Russian-doll: the
//! first middleware added is the outermost, and the innermost `next`
//! reaches the operation itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::OperationError;
use crate::foundry::Foundry;
use crate::operation::Operation;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Boxed future returned by middleware and closure-based operations.
pub type BoxedOutputFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send + 'a>>;

/// Boxed future for closure-based restore handlers.
pub type BoxedRestoreFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), OperationError>> + Send + 'a>>;

/// Middleware that wraps operation execution.
///
/// A middleware can:
/// - Inspect/modify the input before passing it on
/// - Short-circuit by returning without calling `next.run()` — the
///   returned value is recorded as the operation's output
/// - Inspect/transform the result (or the error) after the inner chain
///
/// Uses boxed futures for dyn-compatibility (heterogeneous middleware
/// collections).
pub trait OperationMiddleware: Send + Sync {
    /// Process one invocation, optionally delegating to the rest of the
    /// chain. Must call `next.run` at most once; `next` is consumed.
    fn handle<'a>(
        &'a self,
        operation: &'a dyn Operation,
        foundry: &'a Foundry,
        input: Value,
        next: Next<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxedOutputFuture<'a>;
}

/// The remaining middleware chain plus the underlying operation.
///
/// Consumed on call to prevent double-invoke.
pub struct Next<'a> {
    operation: &'a dyn Operation,
    middleware: &'a [Arc<dyn OperationMiddleware>],
}

impl<'a> Next<'a> {
    /// Create a chain over an operation and a middleware slice. The
    /// first element of the slice becomes the outermost wrapper.
    pub fn new(
        operation: &'a dyn Operation,
        middleware: &'a [Arc<dyn OperationMiddleware>],
    ) -> Self {
        Self {
            operation,
            middleware,
        }
    }

    /// Continue the chain, eventually invoking the operation.
    pub async fn run(
        self,
        foundry: &'a Foundry,
        input: Value,
        cancel: &'a CancellationToken,
    ) -> Result<Value, OperationError> {
        if let Some((head, tail)) = self.middleware.split_first() {
            let next = Next::new(self.operation, tail);
            head.handle(self.operation, foundry, input, next, cancel).await
        } else {
            // End of chain — the operation itself
            self.operation.execute(input, foundry, cancel).await
        }
    }
}

/// Wrapper that implements `OperationMiddleware` for a closure returning
/// a boxed future.
struct MiddlewareFn<F> {
    f: F,
}

impl<F> OperationMiddleware for MiddlewareFn<F>
where
    F: for<'a> Fn(
            &'a dyn Operation,
            &'a Foundry,
            Value,
            Next<'a>,
            &'a CancellationToken,
        ) -> BoxedOutputFuture<'a>
        + Send
        + Sync,
{
    fn handle<'a>(
        &'a self,
        operation: &'a dyn Operation,
        foundry: &'a Foundry,
        input: Value,
        next: Next<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxedOutputFuture<'a> {
        (self.f)(operation, foundry, input, next, cancel)
    }
}

/// Create middleware from a closure.
///
/// The closure must return a `Box::pin(async move { ... })` future.
///
/// # Example
///
/// ```ignore
/// use forge_core::middleware_fn;
///
/// let timing = middleware_fn(|op, foundry, input, next, cancel| {
///     Box::pin(async move {
///         let started = std::time::Instant::now();
///         let result = next.run(foundry, input, cancel).await;
///         foundry.logger().debug(&format!("{} took {:?}", op.name(), started.elapsed()));
///         result
///     })
/// });
/// ```
#[must_use]
pub fn middleware_fn<F>(f: F) -> impl OperationMiddleware
where
    F: for<'a> Fn(
            &'a dyn Operation,
            &'a Foundry,
            Value,
            Next<'a>,
            &'a CancellationToken,
        ) -> BoxedOutputFuture<'a>
        + Send
        + Sync,
{
    MiddlewareFn { f }
}
