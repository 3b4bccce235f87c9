//! Execution options — the recognized toggles a run honors.

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution toggles read by the Smith orchestrator and the Foundry.
/// Every field has the engine's documented default; use the `with_*`
/// methods to adjust only what you need.
///
/// # Example
///
/// ```
/// use forge_core::ForgeOptions;
/// use std::time::Duration;
///
/// let options = ForgeOptions::default()
///     .with_operation_timeout(Duration::from_secs(30))
///     .with_continue_on_error(true);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeOptions {
    /// When true (default), each operation receives the previous
    /// operation's output as input; the first receives null. When false,
    /// every operation receives null and reads state from properties.
    pub output_chaining: bool,

    /// When true, the first failure does not stop the run; errors are
    /// collected and raised once as an aggregate at the end, and no
    /// compensation is performed. Default false.
    pub continue_on_error: bool,

    /// When true (default), compensation proceeds past individual
    /// restore failures; when false it stops at the first one.
    pub continue_on_restore_failure: bool,

    /// When true, a cancelled execution skips compensation entirely.
    /// Default false.
    pub skip_compensation_on_cancel: bool,

    /// When false, compensation is never performed — failures are
    /// reported via events and raised without any restore attempt.
    /// Default true.
    pub auto_restore: bool,

    /// Bound on each single operation invocation. Exceeding it is
    /// treated like any other operation failure. Default none.
    pub operation_timeout: Option<Duration>,

    /// Bound on the whole execution, layered onto the same deadline
    /// checks. Default none.
    pub workflow_timeout: Option<Duration>,

    /// Advisory upper bound on concurrent executions per Smith
    /// instance; excess callers wait. Default unbounded.
    pub max_concurrent_flows: Option<usize>,
}

impl Default for ForgeOptions {
    fn default() -> Self {
        Self {
            output_chaining: true,
            continue_on_error: false,
            continue_on_restore_failure: true,
            skip_compensation_on_cancel: false,
            auto_restore: true,
            operation_timeout: None,
            workflow_timeout: None,
            max_concurrent_flows: None,
        }
    }
}

impl ForgeOptions {
    /// Set whether outputs chain into the next operation's input.
    #[must_use]
    pub fn with_output_chaining(mut self, enabled: bool) -> Self {
        self.output_chaining = enabled;
        self
    }

    /// Set whether failures are collected instead of stopping the run.
    #[must_use]
    pub fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// Set whether compensation proceeds past restore failures.
    #[must_use]
    pub fn with_continue_on_restore_failure(mut self, enabled: bool) -> Self {
        self.continue_on_restore_failure = enabled;
        self
    }

    /// Set whether cancellation skips compensation.
    #[must_use]
    pub fn with_skip_compensation_on_cancel(mut self, enabled: bool) -> Self {
        self.skip_compensation_on_cancel = enabled;
        self
    }

    /// Set whether compensation runs at all.
    #[must_use]
    pub fn with_auto_restore(mut self, enabled: bool) -> Self {
        self.auto_restore = enabled;
        self
    }

    /// Bound each operation invocation.
    #[must_use]
    pub fn with_operation_timeout(mut self, limit: Duration) -> Self {
        self.operation_timeout = Some(limit);
        self
    }

    /// Bound the whole execution.
    #[must_use]
    pub fn with_workflow_timeout(mut self, limit: Duration) -> Self {
        self.workflow_timeout = Some(limit);
        self
    }

    /// Cap concurrent executions per Smith instance.
    #[must_use]
    pub fn with_max_concurrent_flows(mut self, limit: usize) -> Self {
        self.max_concurrent_flows = Some(limit);
        self
    }

    /// Check the options for nonsensical values.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidOptions`] for zero timeouts or a zero
    /// concurrency cap.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.operation_timeout == Some(Duration::ZERO) {
            return Err(BuildError::InvalidOptions(
                "operation_timeout must be greater than zero".into(),
            ));
        }
        if self.workflow_timeout == Some(Duration::ZERO) {
            return Err(BuildError::InvalidOptions(
                "workflow_timeout must be greater than zero".into(),
            ));
        }
        if self.max_concurrent_flows == Some(0) {
            return Err(BuildError::InvalidOptions(
                "max_concurrent_flows must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
