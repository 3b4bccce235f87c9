//! An observer that records every event it sees as a trace line.

use crate::error::ObserverError;
use crate::event::{
    CompensationEvent, CompensationObserver, OperationEvent, OperationObserver, WorkflowEvent,
    WorkflowObserver,
};
use std::sync::{Arc, Mutex, PoisonError};

/// Records workflow, operation, and compensation events as formatted
/// trace lines, in arrival order.
///
/// Register one instance with the foundry (operation events) and the
/// smith (workflow + compensation events) and assert on
/// [`RecordingObserver::trace`]:
///
/// ```text
/// WorkflowStarted
/// OperationStarted(A)
/// OperationCompleted(A, "a")
/// ...
/// CompensationTriggered(2)
/// OperationRestoreStarted(B)
/// ```
#[derive(Default)]
pub struct RecordingObserver {
    trace: Mutex<Vec<String>>,
}

impl RecordingObserver {
    /// Create an empty recorder, shareable across emitters.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The recorded trace lines, in arrival order.
    pub fn trace(&self) -> Vec<String> {
        self.trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, line: String) {
        self.trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

impl WorkflowObserver for RecordingObserver {
    fn on_event(&self, event: &WorkflowEvent<'_>) -> Result<(), ObserverError> {
        match event {
            WorkflowEvent::Started { .. } => self.push("WorkflowStarted".into()),
            WorkflowEvent::Completed { output, .. } => {
                self.push(format!("WorkflowCompleted({output})"));
            }
            WorkflowEvent::Failed { error, .. } => {
                self.push(format!("WorkflowFailed({error})"));
            }
        }
        Ok(())
    }
}

impl OperationObserver for RecordingObserver {
    fn on_event(&self, event: &OperationEvent<'_>) -> Result<(), ObserverError> {
        match event {
            OperationEvent::Started { operation, .. } => {
                self.push(format!("OperationStarted({})", operation.name()));
            }
            OperationEvent::Completed {
                operation, output, ..
            } => {
                self.push(format!("OperationCompleted({}, {output})", operation.name()));
            }
            OperationEvent::Failed { operation, .. } => {
                self.push(format!("OperationFailed({})", operation.name()));
            }
        }
        Ok(())
    }
}

impl CompensationObserver for RecordingObserver {
    fn on_event(&self, event: &CompensationEvent<'_>) -> Result<(), ObserverError> {
        match event {
            CompensationEvent::Triggered { pending, .. } => {
                self.push(format!("CompensationTriggered({pending})"));
            }
            CompensationEvent::RestoreStarted { operation, .. } => {
                self.push(format!("OperationRestoreStarted({})", operation.name()));
            }
            CompensationEvent::RestoreCompleted { operation, .. } => {
                self.push(format!("OperationRestoreCompleted({})", operation.name()));
            }
            CompensationEvent::RestoreFailed { operation, .. } => {
                self.push(format!("OperationRestoreFailed({})", operation.name()));
            }
            CompensationEvent::Completed {
                restored, failed, ..
            } => {
                self.push(format!("CompensationCompleted({restored}, {failed})"));
            }
        }
        Ok(())
    }
}
