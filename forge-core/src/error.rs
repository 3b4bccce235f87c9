//! Error types for each layer of the engine.

use crate::id::{ExecutionId, OperationId, WorkflowId};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by [`crate::builder::WorkflowBuilder::build`] and by
/// options validation. Never raised during execution.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BuildError {
    /// The workflow name was empty or whitespace-only.
    #[error("workflow name must be non-empty")]
    MissingName,

    /// The workflow had no operations.
    #[error("workflow '{0}' has no operations")]
    NoOperations(String),

    /// An operation had an empty name.
    #[error("operation at index {index} has an empty name")]
    UnnamedOperation {
        /// Position of the offending operation.
        index: usize,
    },

    /// Execution options failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

/// Errors from the Foundry execution context: property access, list
/// mutation while frozen, and use after disposal.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FoundryError {
    /// A property key was empty or whitespace-only.
    #[error("property key must be non-empty")]
    InvalidKey,

    /// A required property was not present.
    #[error("property not found: {0}")]
    NotFound(String),

    /// A typed property read could not deserialize the stored value.
    #[error("property '{key}' has an incompatible value: {message}")]
    TypeMismatch {
        /// The key that was read.
        key: String,
        /// The deserialization failure.
        message: String,
    },

    /// The middleware or operation list was mutated during an execution.
    #[error("foundry is frozen while a workflow is executing")]
    Frozen,

    /// The foundry was used after disposal.
    #[error("foundry has been disposed")]
    Disposed,
}

/// Errors produced by a single operation invocation — what user code
/// returns from [`crate::operation::Operation::execute`] and
/// [`crate::operation::Operation::restore`], and what middleware sees
/// flowing out of `next`.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OperationError {
    /// The operation failed with a message.
    #[error("{0}")]
    Failed(String),

    /// The operation observed cancellation and stopped.
    #[error("cancelled")]
    Cancelled,

    /// The operation exceeded a deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A context access inside the operation failed.
    #[error(transparent)]
    Foundry(#[from] FoundryError),

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl OperationError {
    /// Wrap any error type as an operation failure.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(err))
    }
}

/// An `execute` failure wrapped with the identity of where it happened.
///
/// This is what operation observers receive and what
/// [`SmithError::Operation`] carries to the caller; the user error is
/// preserved as the source.
#[derive(Debug, Error)]
#[error("operation '{operation_name}' failed (workflow {workflow_id}, execution {execution_id}): {source}")]
pub struct OperationFailed {
    /// The execution in which the failure occurred.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The failing operation's ID.
    pub operation_id: OperationId,
    /// The failing operation's name.
    pub operation_name: String,
    /// The underlying failure.
    #[source]
    pub source: OperationError,
}

/// A `restore` failure wrapped with the identity of where it happened.
///
/// Reported through compensation observers; compensation failures never
/// replace the triggering error raised to the caller.
#[derive(Debug, Error)]
#[error("restore of operation '{operation_name}' failed (workflow {workflow_id}, execution {execution_id}): {source}")]
pub struct RestoreFailed {
    /// The execution in which the failure occurred.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The failing operation's ID.
    pub operation_id: OperationId,
    /// The failing operation's name.
    pub operation_name: String,
    /// The underlying failure.
    #[source]
    pub source: OperationError,
}

/// Errors raised out of the Smith orchestrator.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SmithError {
    /// An operation failed; compensation of completed operations was
    /// attempted according to the options.
    #[error(transparent)]
    Operation(Box<OperationFailed>),

    /// The execution was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    /// A single operation exceeded the per-operation timeout.
    #[error("operation '{operation}' timed out after {limit:?}")]
    OperationTimeout {
        /// Name of the operation that timed out.
        operation: String,
        /// The configured limit.
        limit: Duration,
    },

    /// The execution exceeded the whole-workflow timeout.
    #[error("workflow timed out after {limit:?}")]
    WorkflowTimeout {
        /// The configured limit.
        limit: Duration,
    },

    /// Aggregate failure from a `continue_on_error` run. No compensation
    /// is performed in this mode.
    #[error("{failed} of {total} operations failed")]
    Aggregate {
        /// The individual failures, in operation order.
        errors: Vec<SmithError>,
        /// How many operations failed.
        failed: usize,
        /// How many operations the workflow had.
        total: usize,
    },

    /// The foundry is already executing a workflow. Concurrent
    /// executions must use distinct foundries.
    #[error("foundry is already executing a workflow")]
    Busy,

    /// A context error outside any operation (seeding, output recording,
    /// use of a disposed foundry).
    #[error(transparent)]
    Foundry(#[from] FoundryError),

    /// Building an inline workflow from a foundry's operation list failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Errors from event observers. These are logged at error severity and
/// never propagate through the engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The observer failed.
    #[error("observer failed: {0}")]
    Failed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_error_display() {
        assert_eq!(OperationError::Cancelled.to_string(), "cancelled");
        assert_eq!(
            OperationError::Failed("boom".into()).to_string(),
            "boom"
        );
    }

    #[test]
    fn operation_failed_preserves_source() {
        use std::error::Error as _;
        let failed = OperationFailed {
            execution_id: ExecutionId::new("ex"),
            workflow_id: WorkflowId::new("wf"),
            operation_id: OperationId::new("op"),
            operation_name: "charge".into(),
            source: OperationError::Failed("card declined".into()),
        };
        assert!(failed.to_string().contains("charge"));
        assert!(failed.source().is_some());
    }

    #[test]
    fn aggregate_display_counts() {
        let err = SmithError::Aggregate {
            errors: vec![SmithError::Cancelled],
            failed: 1,
            total: 3,
        };
        assert_eq!(err.to_string(), "1 of 3 operations failed");
    }
}
