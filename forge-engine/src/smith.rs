//! The Smith — the in-process workflow orchestrator.
//!
//! Drives an immutable workflow against a foundry: operations run
//! strictly in definition order, each wrapped in the foundry's
//! middleware pipeline, outputs recorded into properties, and on failure
//! the completed prefix is compensated in reverse order. Workflow- and
//! compensation-level events are emitted here; operation-level events
//! are emitted through the foundry.
//!
//! A Smith owns no durable state — it borrows a foundry and a workflow
//! for the duration of one call, so one instance can drive any number of
//! concurrent executions as long as each uses its own foundry.

use chrono::Utc;
use forge_core::error::{OperationFailed, RestoreFailed};
use forge_core::event::{
    CompensationEvent, CompensationObserver, OperationEvent, OperationObserver, WorkflowEvent,
    WorkflowObserver, dispatch_compensation_event, dispatch_workflow_event,
};
use forge_core::foundry::{
    Foundry, LAST_COMPLETED_INDEX_KEY, LAST_COMPLETED_NAME_KEY, operation_output_key,
};
use forge_core::logger::{ForgeLogger, LogFields, LogLevel, NoopLogger};
use forge_core::middleware::{Next, OperationMiddleware};
use forge_core::operation::Operation;
use forge_core::options::ForgeOptions;
use forge_core::workflow::Workflow;
use forge_core::{OperationError, SmithError, WorkflowBuilder};
use serde_json::{Value, json};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Which configured limit bounds the current operation invocation.
enum Bound {
    /// The per-operation timeout.
    Operation(Duration),
    /// The remaining budget of the whole-workflow timeout.
    Workflow {
        effective: Duration,
        limit: Duration,
    },
}

impl Bound {
    fn effective(&self) -> Duration {
        match self {
            Bound::Operation(limit) => *limit,
            Bound::Workflow { effective, .. } => *effective,
        }
    }
}

/// The workflow orchestrator.
///
/// Construct with [`Smith::new`] and the `with_*`/`observe_*` methods,
/// or through [`crate::Forge`]. Three execution shapes share one
/// normalised path:
///
/// - [`Smith::execute`] — fresh internal foundry, disposed afterwards
/// - [`Smith::execute_seeded`] — same, with the property map seeded
/// - [`Smith::execute_with`] — a caller-provided foundry
///
/// The return value is the final operation's output, which is also what
/// the `WorkflowCompleted` event reports. There is no separate
/// user-controllable result slot; state handoff belongs to the property
/// map.
pub struct Smith {
    logger: Arc<dyn ForgeLogger>,
    options: ForgeOptions,
    services: Option<Arc<dyn Any + Send + Sync>>,
    workflow_observers: Vec<Arc<dyn WorkflowObserver>>,
    compensation_observers: Vec<Arc<dyn CompensationObserver>>,
    operation_observers: Vec<Arc<dyn OperationObserver>>,
    permits: Option<Arc<Semaphore>>,
}

impl Smith {
    /// Create a smith with a no-op logger and default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logger: Arc::new(NoopLogger),
            options: ForgeOptions::default(),
            services: None,
            workflow_observers: Vec::new(),
            compensation_observers: Vec::new(),
            operation_observers: Vec::new(),
            permits: None,
        }
    }

    /// Replace the logger used by this smith and by the foundries it
    /// creates internally.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn ForgeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the default options for internally-created foundries and the
    /// smith-level concurrency cap.
    #[must_use]
    pub fn with_options(mut self, options: ForgeOptions) -> Self {
        self.permits = options
            .max_concurrent_flows
            .map(|cap| Arc::new(Semaphore::new(cap)));
        self.options = options;
        self
    }

    /// Attach a service handle handed to internally-created foundries.
    #[must_use]
    pub fn with_services<T: Send + Sync + 'static>(self, services: Arc<T>) -> Self {
        let erased: Arc<dyn Any + Send + Sync> = services;
        self.with_service_handle(erased)
    }

    /// Attach an already-erased service handle.
    #[must_use]
    pub fn with_service_handle(mut self, services: Arc<dyn Any + Send + Sync>) -> Self {
        self.services = Some(services);
        self
    }

    /// Register a workflow-lifecycle observer.
    #[must_use]
    pub fn observe_workflow(mut self, observer: Arc<dyn WorkflowObserver>) -> Self {
        self.workflow_observers.push(observer);
        self
    }

    /// Register a compensation-lifecycle observer.
    #[must_use]
    pub fn observe_compensation(mut self, observer: Arc<dyn CompensationObserver>) -> Self {
        self.compensation_observers.push(observer);
        self
    }

    /// Register an operation-lifecycle observer, installed on
    /// internally-created foundries. Caller-provided foundries keep
    /// their own observer list.
    #[must_use]
    pub fn observe_operations(mut self, observer: Arc<dyn OperationObserver>) -> Self {
        self.operation_observers.push(observer);
        self
    }

    /// Execute a workflow against a fresh internal foundry, which is
    /// disposed when the call returns.
    ///
    /// # Errors
    ///
    /// See [`SmithError`]; the triggering error is raised after
    /// compensation, never replaced by a compensation failure.
    pub async fn execute(
        &self,
        workflow: &Arc<Workflow>,
        cancel: &CancellationToken,
    ) -> Result<Value, SmithError> {
        let foundry = self.new_foundry();
        let result = self.execute_with(workflow, &foundry, cancel).await;
        foundry.dispose();
        result
    }

    /// Execute a workflow against a fresh internal foundry whose
    /// property map is seeded from `seed` first.
    ///
    /// # Errors
    ///
    /// Seed keys are validated like any property key; an invalid key
    /// fails the call before the workflow starts.
    pub async fn execute_seeded<I>(
        &self,
        workflow: &Arc<Workflow>,
        seed: I,
        cancel: &CancellationToken,
    ) -> Result<Value, SmithError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let foundry = self.new_foundry();
        let mut seed_error = None;
        for (key, value) in seed {
            if let Err(e) = foundry.set_property(key, value) {
                seed_error = Some(e);
                break;
            }
        }
        let result = match seed_error {
            Some(e) => Err(SmithError::Foundry(e)),
            None => self.execute_with(workflow, &foundry, cancel).await,
        };
        foundry.dispose();
        result
    }

    /// Execute a workflow against a caller-provided foundry.
    ///
    /// The foundry's options govern the run. Its middleware and
    /// operation lists are frozen for the duration; the current-workflow
    /// reference is set on entry and cleared on exit.
    ///
    /// # Errors
    ///
    /// [`SmithError::Busy`] if the foundry is already executing —
    /// concurrent executions on one foundry fail fast rather than
    /// serialize.
    pub async fn execute_with(
        &self,
        workflow: &Arc<Workflow>,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, SmithError> {
        // The semaphore is never closed, so acquire only fails if it
        // were; treat that as an open gate.
        let _permit = match &self.permits {
            Some(semaphore) => semaphore.acquire().await.ok(),
            None => None,
        };

        if !foundry.try_begin(Arc::clone(workflow))? {
            return Err(SmithError::Busy);
        }
        let result = self.run(workflow, foundry, cancel).await;
        foundry.finish();
        result
    }

    /// Forge the foundry's own operation list as an anonymous workflow —
    /// the advanced path where a foundry doubles as a mini-workflow.
    ///
    /// # Errors
    ///
    /// [`SmithError::Build`] when the foundry holds no operations.
    pub async fn forge(
        &self,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, SmithError> {
        let mut builder = WorkflowBuilder::new(format!("foundry:{}", foundry.execution_id()));
        for operation in foundry.operations() {
            builder = builder.operation_arc(operation);
        }
        let workflow = Arc::new(builder.build()?);
        self.execute_with(&workflow, foundry, cancel).await
    }

    fn new_foundry(&self) -> Foundry {
        let mut foundry = Foundry::new()
            .with_logger(Arc::clone(&self.logger))
            .with_options(self.options.clone());
        if let Some(services) = &self.services {
            foundry = foundry.with_service_handle(Arc::clone(services));
        }
        for observer in &self.operation_observers {
            // The foundry is not executing yet, so registration cannot fail.
            let _ = foundry.add_observer(Arc::clone(observer));
        }
        foundry
    }

    /// One normalised execution. The foundry is already in the
    /// executing state; the caller clears it.
    async fn run(
        &self,
        workflow: &Arc<Workflow>,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, SmithError> {
        let options = foundry.options().clone();
        let middleware = foundry.middleware();
        let logger = Arc::clone(foundry.logger());
        let started = Instant::now();
        let deadline = options
            .workflow_timeout
            .map(|limit| (started + limit, limit));

        let mut scope_fields = LogFields::new();
        scope_fields.insert("workflow".into(), json!(workflow.name()));
        scope_fields.insert("execution_id".into(), json!(foundry.execution_id().as_str()));
        let _scope = logger.begin_scope("workflow", scope_fields);
        logger.info("workflow started");

        dispatch_workflow_event(
            &self.workflow_observers,
            logger.as_ref(),
            &WorkflowEvent::Started {
                workflow,
                execution_id: foundry.execution_id(),
                at: Utc::now(),
            },
        );

        let mut completed: Vec<(usize, Arc<dyn Operation>, Value)> = Vec::new();
        let mut collected: Vec<SmithError> = Vec::new();
        let mut previous = Value::Null;
        let mut failure: Option<SmithError> = None;

        for (index, operation) in workflow.operations().iter().enumerate() {
            // A token that fired between operations fails the run before
            // the next operation starts (no operation events for it).
            if cancel.is_cancelled() {
                failure = Some(SmithError::Cancelled);
                break;
            }

            let input = if options.output_chaining {
                previous.clone()
            } else {
                Value::Null
            };

            foundry.emit(&OperationEvent::Started {
                operation: operation.as_ref(),
                index,
                input: &input,
                execution_id: foundry.execution_id(),
                at: Utc::now(),
            });

            let bound = Self::effective_bound(&options, deadline);
            let invoke_started = Instant::now();
            let mut outcome =
                Self::invoke(operation.as_ref(), &middleware, foundry, input, cancel, &bound)
                    .await;
            let duration = invoke_started.elapsed();

            // A token that fired while the operation ran fails the run
            // even if the operation did not observe it.
            if outcome.is_ok() && cancel.is_cancelled() {
                outcome = Err(OperationError::Cancelled);
            }

            match outcome {
                Ok(output) => {
                    Self::record_output(foundry, index, operation.name(), &output)?;
                    foundry.emit(&OperationEvent::Completed {
                        operation: operation.as_ref(),
                        index,
                        output: &output,
                        duration,
                        execution_id: foundry.execution_id(),
                        at: Utc::now(),
                    });
                    completed.push((index, Arc::clone(operation), output.clone()));
                    previous = output;
                }
                Err(source) => {
                    let wrapped = OperationFailed {
                        execution_id: foundry.execution_id().clone(),
                        workflow_id: workflow.id().clone(),
                        operation_id: operation.id().clone(),
                        operation_name: operation.name().to_string(),
                        source,
                    };
                    logger.log(
                        LogLevel::Error,
                        "operation failed",
                        None,
                        Some(&wrapped),
                    );
                    foundry.emit(&OperationEvent::Failed {
                        operation: operation.as_ref(),
                        index,
                        error: &wrapped,
                        duration,
                        execution_id: foundry.execution_id(),
                        at: Utc::now(),
                    });
                    let error = Self::classify(wrapped, &bound);
                    if options.continue_on_error {
                        collected.push(error);
                        previous = Value::Null;
                    } else {
                        failure = Some(error);
                        break;
                    }
                }
            }
        }

        if let Some(trigger) = failure {
            let skip_for_cancel = matches!(trigger, SmithError::Cancelled)
                && options.skip_compensation_on_cancel;
            if options.auto_restore && !skip_for_cancel {
                self.compensate(workflow, foundry, &completed, &trigger, &options, cancel)
                    .await;
            }
            logger.log(LogLevel::Error, "workflow failed", None, Some(&trigger));
            dispatch_workflow_event(
                &self.workflow_observers,
                logger.as_ref(),
                &WorkflowEvent::Failed {
                    workflow,
                    execution_id: foundry.execution_id(),
                    error: &trigger,
                    duration: started.elapsed(),
                    at: Utc::now(),
                },
            );
            return Err(trigger);
        }

        if !collected.is_empty() {
            let aggregate = SmithError::Aggregate {
                failed: collected.len(),
                total: workflow.len(),
                errors: collected,
            };
            logger.log(LogLevel::Error, "workflow failed", None, Some(&aggregate));
            dispatch_workflow_event(
                &self.workflow_observers,
                logger.as_ref(),
                &WorkflowEvent::Failed {
                    workflow,
                    execution_id: foundry.execution_id(),
                    error: &aggregate,
                    duration: started.elapsed(),
                    at: Utc::now(),
                },
            );
            return Err(aggregate);
        }

        logger.info("workflow completed");
        dispatch_workflow_event(
            &self.workflow_observers,
            logger.as_ref(),
            &WorkflowEvent::Completed {
                workflow,
                execution_id: foundry.execution_id(),
                output: &previous,
                duration: started.elapsed(),
                at: Utc::now(),
            },
        );
        Ok(previous)
    }

    /// Restore the completed prefix in reverse order, emitting
    /// compensation events. Restore failures are reported through events
    /// and the logger; they never replace the triggering error.
    ///
    /// A token that was already cancelled on entry (the trigger was the
    /// cancellation itself) does not abort compensation; a cancellation
    /// that arrives *during* compensation stops further restores
    /// regardless of `continue_on_restore_failure`.
    async fn compensate(
        &self,
        workflow: &Arc<Workflow>,
        foundry: &Foundry,
        completed: &[(usize, Arc<dyn Operation>, Value)],
        trigger: &SmithError,
        options: &ForgeOptions,
        cancel: &CancellationToken,
    ) {
        let logger = foundry.logger();
        dispatch_compensation_event(
            &self.compensation_observers,
            logger.as_ref(),
            &CompensationEvent::Triggered {
                workflow,
                execution_id: foundry.execution_id(),
                trigger,
                pending: completed.len(),
                at: Utc::now(),
            },
        );

        let abort_on_cancel = !cancel.is_cancelled();
        let mut restored = 0usize;
        let mut failed = 0usize;

        for (index, operation, output) in completed.iter().rev() {
            if abort_on_cancel && cancel.is_cancelled() {
                logger.warn("compensation aborted by cancellation");
                break;
            }
            dispatch_compensation_event(
                &self.compensation_observers,
                logger.as_ref(),
                &CompensationEvent::RestoreStarted {
                    operation: operation.as_ref(),
                    index: *index,
                    execution_id: foundry.execution_id(),
                    at: Utc::now(),
                },
            );
            let restore_started = Instant::now();
            match operation.restore(output.clone(), foundry, cancel).await {
                Ok(()) => {
                    restored += 1;
                    dispatch_compensation_event(
                        &self.compensation_observers,
                        logger.as_ref(),
                        &CompensationEvent::RestoreCompleted {
                            operation: operation.as_ref(),
                            index: *index,
                            duration: restore_started.elapsed(),
                            execution_id: foundry.execution_id(),
                            at: Utc::now(),
                        },
                    );
                }
                Err(source) => {
                    failed += 1;
                    let wrapped = RestoreFailed {
                        execution_id: foundry.execution_id().clone(),
                        workflow_id: workflow.id().clone(),
                        operation_id: operation.id().clone(),
                        operation_name: operation.name().to_string(),
                        source,
                    };
                    logger.log(
                        LogLevel::Error,
                        "operation restore failed",
                        None,
                        Some(&wrapped),
                    );
                    dispatch_compensation_event(
                        &self.compensation_observers,
                        logger.as_ref(),
                        &CompensationEvent::RestoreFailed {
                            operation: operation.as_ref(),
                            index: *index,
                            error: &wrapped,
                            duration: restore_started.elapsed(),
                            execution_id: foundry.execution_id(),
                            at: Utc::now(),
                        },
                    );
                    if !options.continue_on_restore_failure {
                        break;
                    }
                }
            }
        }

        dispatch_compensation_event(
            &self.compensation_observers,
            logger.as_ref(),
            &CompensationEvent::Completed {
                restored,
                failed,
                execution_id: foundry.execution_id(),
                at: Utc::now(),
            },
        );
    }

    /// Invoke one operation through the middleware pipeline, bounded by
    /// the effective timeout if any.
    async fn invoke(
        operation: &dyn Operation,
        middleware: &[Arc<dyn OperationMiddleware>],
        foundry: &Foundry,
        input: Value,
        cancel: &CancellationToken,
        bound: &Option<Bound>,
    ) -> Result<Value, OperationError> {
        let next = Next::new(operation, middleware);
        match bound {
            Some(bound) => {
                let limit = bound.effective();
                match tokio::time::timeout(limit, next.run(foundry, input, cancel)).await {
                    Ok(result) => result,
                    Err(_) => Err(OperationError::Timeout(limit)),
                }
            }
            None => next.run(foundry, input, cancel).await,
        }
    }

    /// The tighter of the per-operation timeout and the remaining
    /// whole-workflow budget, if either is configured.
    fn effective_bound(
        options: &ForgeOptions,
        deadline: Option<(Instant, Duration)>,
    ) -> Option<Bound> {
        let remaining = deadline
            .map(|(instant, limit)| (instant.saturating_duration_since(Instant::now()), limit));
        match (options.operation_timeout, remaining) {
            (None, None) => None,
            (Some(per_op), None) => Some(Bound::Operation(per_op)),
            (None, Some((effective, limit))) => Some(Bound::Workflow { effective, limit }),
            (Some(per_op), Some((effective, limit))) => {
                if per_op <= effective {
                    Some(Bound::Operation(per_op))
                } else {
                    Some(Bound::Workflow { effective, limit })
                }
            }
        }
    }

    /// Map a wrapped operation failure to the error kind raised to the
    /// caller: cancellation and timeouts keep their own kinds, anything
    /// else raises as an operation failure with the cause preserved.
    fn classify(wrapped: OperationFailed, bound: &Option<Bound>) -> SmithError {
        match (&wrapped.source, bound) {
            (OperationError::Cancelled, _) => SmithError::Cancelled,
            (OperationError::Timeout(_), Some(Bound::Workflow { limit, .. })) => {
                SmithError::WorkflowTimeout { limit: *limit }
            }
            (OperationError::Timeout(limit), _) => SmithError::OperationTimeout {
                operation: wrapped.operation_name.clone(),
                limit: *limit,
            },
            _ => SmithError::Operation(Box::new(wrapped)),
        }
    }

    /// Record a completed operation's output under the reserved property
    /// namespace.
    fn record_output(
        foundry: &Foundry,
        index: usize,
        name: &str,
        output: &Value,
    ) -> Result<(), SmithError> {
        foundry.set_property(operation_output_key(index, name), output.clone())?;
        foundry.set_property(LAST_COMPLETED_INDEX_KEY, json!(index))?;
        foundry.set_property(LAST_COMPLETED_NAME_KEY, json!(name))?;
        Ok(())
    }
}

impl Default for Smith {
    fn default() -> Self {
        Self::new()
    }
}
