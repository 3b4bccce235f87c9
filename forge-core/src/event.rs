//! Event records and observer interfaces.
//!
//! Three segregated observer capabilities, fired by different emitters:
//! workflow lifecycle and compensation lifecycle by the orchestrator,
//! operation lifecycle by the foundry. Events are borrowed records
//! created at transition points and consumed synchronously on the
//! executing thread, in the order they occur within one execution.
//! Observer errors are logged at error severity and never propagate.

use crate::error::{ObserverError, OperationFailed, RestoreFailed, SmithError};
use crate::id::ExecutionId;
use crate::logger::{ForgeLogger, LogLevel};
use crate::operation::Operation;
use crate::workflow::Workflow;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Workflow lifecycle events, emitted by the orchestrator.
#[non_exhaustive]
pub enum WorkflowEvent<'a> {
    /// Execution entered the running state.
    Started {
        /// The workflow being executed.
        workflow: &'a Workflow,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
    /// Execution finished successfully.
    Completed {
        /// The workflow that was executed.
        workflow: &'a Workflow,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// The final operation's output — the workflow result.
        output: &'a Value,
        /// Elapsed wall-clock time.
        duration: Duration,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
    /// Execution failed. Compensation, if any, already finished.
    Failed {
        /// The workflow that was executed.
        workflow: &'a Workflow,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// The triggering error — the same one raised to the caller.
        error: &'a SmithError,
        /// Elapsed wall-clock time.
        duration: Duration,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
}

/// Operation lifecycle events, emitted by the foundry.
#[non_exhaustive]
pub enum OperationEvent<'a> {
    /// An operation is about to be invoked (through its middleware).
    Started {
        /// The operation.
        operation: &'a dyn Operation,
        /// Position in the workflow's sequence.
        index: usize,
        /// The input it will receive.
        input: &'a Value,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
    /// The operation (or a short-circuiting middleware) produced output.
    Completed {
        /// The operation.
        operation: &'a dyn Operation,
        /// Position in the workflow's sequence.
        index: usize,
        /// The recorded output.
        output: &'a Value,
        /// Time spent in the middleware pipeline and operation.
        duration: Duration,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
    /// The invocation failed.
    Failed {
        /// The operation.
        operation: &'a dyn Operation,
        /// Position in the workflow's sequence.
        index: usize,
        /// The wrapped failure, tagged with execution/workflow identity.
        error: &'a OperationFailed,
        /// Time spent before failing.
        duration: Duration,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
}

/// Compensation lifecycle events, emitted by the orchestrator.
#[non_exhaustive]
pub enum CompensationEvent<'a> {
    /// A failure broke the run; completed operations will be restored in
    /// reverse order.
    Triggered {
        /// The workflow being compensated.
        workflow: &'a Workflow,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// The error that triggered compensation.
        trigger: &'a SmithError,
        /// How many completed operations are pending restore.
        pending: usize,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
    /// A restore is about to run.
    RestoreStarted {
        /// The operation being restored.
        operation: &'a dyn Operation,
        /// Its position in the workflow's sequence.
        index: usize,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
    /// A restore finished.
    RestoreCompleted {
        /// The operation that was restored.
        operation: &'a dyn Operation,
        /// Its position in the workflow's sequence.
        index: usize,
        /// Time spent restoring.
        duration: Duration,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
    /// A restore failed. Reported here only — compensation failures
    /// never replace the triggering error raised to the caller.
    RestoreFailed {
        /// The operation whose restore failed.
        operation: &'a dyn Operation,
        /// Its position in the workflow's sequence.
        index: usize,
        /// The wrapped failure, tagged with execution/workflow identity.
        error: &'a RestoreFailed,
        /// Time spent before failing.
        duration: Duration,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
    /// Compensation finished (possibly partially).
    Completed {
        /// How many restores succeeded.
        restored: usize,
        /// How many restores failed.
        failed: usize,
        /// The execution this event belongs to.
        execution_id: &'a ExecutionId,
        /// When the transition happened.
        at: DateTime<Utc>,
    },
}

/// Observer of workflow lifecycle events.
///
/// Methods are synchronous: events fire on the executing thread at the
/// transition point. Returning an error does NOT affect the run — it is
/// logged and execution continues.
pub trait WorkflowObserver: Send + Sync {
    /// Called at each workflow transition.
    fn on_event(&self, event: &WorkflowEvent<'_>) -> Result<(), ObserverError>;
}

/// Observer of operation lifecycle events. Same dispatch discipline as
/// [`WorkflowObserver`].
pub trait OperationObserver: Send + Sync {
    /// Called at each operation transition.
    fn on_event(&self, event: &OperationEvent<'_>) -> Result<(), ObserverError>;
}

/// Observer of compensation lifecycle events. Same dispatch discipline
/// as [`WorkflowObserver`].
pub trait CompensationObserver: Send + Sync {
    /// Called at each compensation transition.
    fn on_event(&self, event: &CompensationEvent<'_>) -> Result<(), ObserverError>;
}

fn log_observer_failure(logger: &dyn ForgeLogger, what: &str, error: &ObserverError) {
    logger.log(
        LogLevel::Error,
        &format!("{what} observer failed"),
        None,
        Some(error),
    );
}

/// Dispatch one workflow event to every observer, logging failures.
pub fn dispatch_workflow_event(
    observers: &[Arc<dyn WorkflowObserver>],
    logger: &dyn ForgeLogger,
    event: &WorkflowEvent<'_>,
) {
    for observer in observers {
        if let Err(e) = observer.on_event(event) {
            log_observer_failure(logger, "workflow", &e);
        }
    }
}

/// Dispatch one operation event to every observer, logging failures.
pub fn dispatch_operation_event(
    observers: &[Arc<dyn OperationObserver>],
    logger: &dyn ForgeLogger,
    event: &OperationEvent<'_>,
) {
    for observer in observers {
        if let Err(e) = observer.on_event(event) {
            log_observer_failure(logger, "operation", &e);
        }
    }
}

/// Dispatch one compensation event to every observer, logging failures.
pub fn dispatch_compensation_event(
    observers: &[Arc<dyn CompensationObserver>],
    logger: &dyn ForgeLogger,
    event: &CompensationEvent<'_>,
) {
    for observer in observers {
        if let Err(e) = observer.on_event(event) {
            log_observer_failure(logger, "compensation", &e);
        }
    }
}
