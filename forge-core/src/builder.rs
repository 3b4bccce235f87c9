//! Fluent assembly of workflow definitions.

use crate::builtin::DelegateOperation;
use crate::error::BuildError;
use crate::middleware::{BoxedOutputFuture, BoxedRestoreFuture};
use crate::operation::Operation;
use crate::workflow::Workflow;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::foundry::Foundry;

const DEFAULT_VERSION: &str = "1.0.0";

/// Builder for a [`Workflow`].
///
/// Only the name is required up front; operations are appended in
/// execution order and the definition is validated once at
/// [`WorkflowBuilder::build`].
///
/// # Example
///
/// ```ignore
/// let workflow = WorkflowBuilder::new("provision-account")
///     .description("Creates the account and its side resources")
///     .version("2.1.0")
///     .operation(CreateAccount::new())
///     .operation_fn("notify", |input, foundry, _cancel| {
///         Box::pin(async move {
///             foundry.logger().info("notifying");
///             Ok(input)
///         })
///     })
///     .build()?;
/// ```
pub struct WorkflowBuilder {
    name: String,
    description: Option<String>,
    version: String,
    operations: Vec<Arc<dyn Operation>>,
}

impl WorkflowBuilder {
    /// Start a builder for a workflow with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            version: DEFAULT_VERSION.to_string(),
            operations: Vec::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the version string. Defaults to `1.0.0`.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Append an operation.
    #[must_use]
    pub fn operation<O: Operation + 'static>(mut self, operation: O) -> Self {
        self.operations.push(Arc::new(operation));
        self
    }

    /// Append an already-shared operation.
    #[must_use]
    pub fn operation_arc(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operations.push(operation);
        self
    }

    /// Append a closure as an operation. The closure must return a
    /// `Box::pin(async move { ... })` future.
    #[must_use]
    pub fn operation_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(Value, &'a Foundry, &'a CancellationToken) -> BoxedOutputFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.operation(DelegateOperation::new(name, f))
    }

    /// Append a closure operation with a restore handler for
    /// compensation.
    #[must_use]
    pub fn compensable_fn<F, R>(self, name: impl Into<String>, f: F, restore: R) -> Self
    where
        F: for<'a> Fn(Value, &'a Foundry, &'a CancellationToken) -> BoxedOutputFuture<'a>
            + Send
            + Sync
            + 'static,
        R: for<'a> Fn(Value, &'a Foundry, &'a CancellationToken) -> BoxedRestoreFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.operation(DelegateOperation::new(name, f).with_restore(restore))
    }

    /// Validate and freeze the definition.
    ///
    /// # Errors
    ///
    /// [`BuildError::MissingName`] if the workflow name is empty or
    /// whitespace-only, [`BuildError::NoOperations`] if no operations
    /// were added, and [`BuildError::UnnamedOperation`] if any operation
    /// reports an empty name.
    pub fn build(self) -> Result<Workflow, BuildError> {
        if self.name.trim().is_empty() {
            return Err(BuildError::MissingName);
        }
        if self.operations.is_empty() {
            return Err(BuildError::NoOperations(self.name));
        }
        for (index, operation) in self.operations.iter().enumerate() {
            if operation.name().trim().is_empty() {
                return Err(BuildError::UnnamedOperation { index });
            }
        }
        Ok(Workflow::new(
            self.name,
            self.description,
            self.version,
            self.operations,
        ))
    }
}
