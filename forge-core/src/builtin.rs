//! Built-in operation primitives.
//!
//! Small, composable operations covering the common shapes: closure
//! adapters ([`DelegateOperation`], [`ActionOperation`]), control flow
//! ([`ConditionalOperation`], [`ForEachOperation`]), and utilities
//! ([`DelayOperation`], [`LogOperation`]).

use crate::error::OperationError;
use crate::foundry::Foundry;
use crate::id::OperationId;
use crate::logger::{LogFields, LogLevel};
use crate::middleware::{BoxedOutputFuture, BoxedRestoreFuture};
use crate::operation::Operation;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type ExecuteHandler =
    dyn for<'a> Fn(Value, &'a Foundry, &'a CancellationToken) -> BoxedOutputFuture<'a>
        + Send
        + Sync;

type RestoreHandler =
    dyn for<'a> Fn(Value, &'a Foundry, &'a CancellationToken) -> BoxedRestoreFuture<'a>
        + Send
        + Sync;

type ActionHandler =
    dyn for<'a> Fn(&'a Value, &'a Foundry, &'a CancellationToken) -> BoxedRestoreFuture<'a>
        + Send
        + Sync;

type Predicate = dyn Fn(&Foundry, &Value) -> Result<bool, OperationError> + Send + Sync;

type CollectionSource =
    dyn Fn(&Foundry, &Value) -> Result<Vec<Value>, OperationError> + Send + Sync;

// --- Delegate ---

/// Adapter that exposes a closure as an [`Operation`], with an optional
/// restore closure for compensation.
///
/// Closures return `Box::pin(async move { ... })` futures, the same
/// shape as [`crate::middleware_fn`].
pub struct DelegateOperation {
    id: OperationId,
    name: String,
    execute: Box<ExecuteHandler>,
    restore: Option<Box<RestoreHandler>>,
}

impl DelegateOperation {
    /// Wrap a closure as an operation.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, execute: F) -> Self
    where
        F: for<'a> Fn(Value, &'a Foundry, &'a CancellationToken) -> BoxedOutputFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: OperationId::generate(),
            name: name.into(),
            execute: Box::new(execute),
            restore: None,
        }
    }

    /// Attach a restore closure. The operation then reports itself
    /// restore-capable.
    #[must_use]
    pub fn with_restore<R>(mut self, restore: R) -> Self
    where
        R: for<'a> Fn(Value, &'a Foundry, &'a CancellationToken) -> BoxedRestoreFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.restore = Some(Box::new(restore));
        self
    }
}

#[async_trait]
impl Operation for DelegateOperation {
    fn id(&self) -> &OperationId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        (self.execute)(input, foundry, cancel).await
    }

    async fn restore(
        &self,
        output: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        match &self.restore {
            Some(restore) => restore(output, foundry, cancel).await,
            None => Ok(()),
        }
    }

    fn supports_restore(&self) -> bool {
        self.restore.is_some()
    }
}

// --- Action ---

/// A side-effect operation: runs a closure, discards its result, and
/// passes the input through unchanged.
pub struct ActionOperation {
    id: OperationId,
    name: String,
    action: Box<ActionHandler>,
}

impl ActionOperation {
    /// Wrap a side-effecting closure.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: for<'a> Fn(&'a Value, &'a Foundry, &'a CancellationToken) -> BoxedRestoreFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: OperationId::generate(),
            name: name.into(),
            action: Box::new(action),
        }
    }
}

#[async_trait]
impl Operation for ActionOperation {
    fn id(&self) -> &OperationId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        (self.action)(&input, foundry, cancel).await?;
        Ok(input)
    }
}

// --- Conditional ---

/// Evaluates a predicate and executes one of two branches.
///
/// The taken branch is recorded under the reserved property key
/// `Operation.{id}.Branch` so that compensation restores only the branch
/// that actually ran. Without an else-branch, a false predicate passes
/// the input through unchanged.
pub struct ConditionalOperation {
    id: OperationId,
    name: String,
    predicate: Box<Predicate>,
    when_true: Arc<dyn Operation>,
    when_false: Option<Arc<dyn Operation>>,
}

impl ConditionalOperation {
    /// Build a conditional with a then-branch only.
    #[must_use]
    pub fn new<P>(name: impl Into<String>, predicate: P, when_true: Arc<dyn Operation>) -> Self
    where
        P: Fn(&Foundry, &Value) -> Result<bool, OperationError> + Send + Sync + 'static,
    {
        Self {
            id: OperationId::generate(),
            name: name.into(),
            predicate: Box::new(predicate),
            when_true,
            when_false: None,
        }
    }

    /// Attach an else-branch.
    #[must_use]
    pub fn with_else(mut self, when_false: Arc<dyn Operation>) -> Self {
        self.when_false = Some(when_false);
        self
    }

    fn branch_key(&self) -> String {
        format!("Operation.{}.Branch", self.id)
    }
}

#[async_trait]
impl Operation for ConditionalOperation {
    fn id(&self) -> &OperationId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        let taken = (self.predicate)(foundry, &input)?;
        foundry.set_property(self.branch_key(), json!(taken))?;
        if taken {
            self.when_true.execute(input, foundry, cancel).await
        } else {
            match &self.when_false {
                Some(branch) => branch.execute(input, foundry, cancel).await,
                None => Ok(input),
            }
        }
    }

    async fn restore(
        &self,
        output: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        let Some(taken) = foundry.property_as::<bool>(&self.branch_key())? else {
            return Ok(());
        };
        if taken {
            self.when_true.restore(output, foundry, cancel).await
        } else {
            match &self.when_false {
                Some(branch) => branch.restore(output, foundry, cancel).await,
                None => Ok(()),
            }
        }
    }

    fn supports_restore(&self) -> bool {
        self.when_true.supports_restore()
            || self
                .when_false
                .as_ref()
                .is_some_and(|branch| branch.supports_restore())
    }
}

// --- ForEach ---

/// Executes an inner operation once per element of a collection, in
/// order. The output is the array of element outputs.
///
/// Compensation replays the inner restore per element in reverse order.
/// If an element fails mid-iteration, the elements that already ran are
/// rolled back in reverse before the error propagates, so the operation
/// never leaves partial work behind a failure.
pub struct ForEachOperation {
    id: OperationId,
    name: String,
    inner: Arc<dyn Operation>,
    source: Option<Box<CollectionSource>>,
}

impl ForEachOperation {
    /// Iterate the inner operation over the input, which must be an
    /// array.
    #[must_use]
    pub fn new(name: impl Into<String>, inner: Arc<dyn Operation>) -> Self {
        Self {
            id: OperationId::generate(),
            name: name.into(),
            inner,
            source: None,
        }
    }

    /// Supply the collection from a closure instead of the input.
    #[must_use]
    pub fn with_source<F>(mut self, source: F) -> Self
    where
        F: Fn(&Foundry, &Value) -> Result<Vec<Value>, OperationError> + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    fn items(&self, foundry: &Foundry, input: &Value) -> Result<Vec<Value>, OperationError> {
        match &self.source {
            Some(source) => source(foundry, input),
            None => input
                .as_array()
                .cloned()
                .ok_or_else(|| {
                    OperationError::Failed(format!(
                        "operation '{}' expects an array input",
                        self.name
                    ))
                }),
        }
    }

    async fn roll_back(
        &self,
        outputs: &[Value],
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) {
        for output in outputs.iter().rev() {
            if let Err(e) = self.inner.restore(output.clone(), foundry, cancel).await {
                foundry.logger().log(
                    LogLevel::Error,
                    &format!("rollback of '{}' element failed", self.inner.name()),
                    None,
                    Some(&e),
                );
            }
        }
    }
}

#[async_trait]
impl Operation for ForEachOperation {
    fn id(&self) -> &OperationId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        let items = self.items(foundry, &input)?;
        let mut outputs = Vec::with_capacity(items.len());
        for item in items {
            if cancel.is_cancelled() {
                self.roll_back(&outputs, foundry, cancel).await;
                return Err(OperationError::Cancelled);
            }
            match self.inner.execute(item, foundry, cancel).await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    self.roll_back(&outputs, foundry, cancel).await;
                    return Err(e);
                }
            }
        }
        Ok(Value::Array(outputs))
    }

    async fn restore(
        &self,
        output: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        let Value::Array(outputs) = output else {
            return Ok(());
        };
        for element in outputs.into_iter().rev() {
            self.inner.restore(element, foundry, cancel).await?;
        }
        Ok(())
    }

    fn supports_restore(&self) -> bool {
        self.inner.supports_restore()
    }
}

// --- Delay ---

/// Sleeps for a configured duration, cooperatively cancellable. Passes
/// the input through unchanged.
pub struct DelayOperation {
    id: OperationId,
    name: String,
    duration: Duration,
}

impl DelayOperation {
    /// Create a delay of the given duration.
    #[must_use]
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            id: OperationId::generate(),
            name: name.into(),
            duration,
        }
    }
}

#[async_trait]
impl Operation for DelayOperation {
    fn id(&self) -> &OperationId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: Value,
        _foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        tokio::select! {
            () = cancel.cancelled() => Err(OperationError::Cancelled),
            () = tokio::time::sleep(self.duration) => Ok(input),
        }
    }
}

// --- Log ---

/// Emits one structured log line with context fields, then passes the
/// input through unchanged.
pub struct LogOperation {
    id: OperationId,
    name: String,
    level: LogLevel,
    message: String,
}

impl LogOperation {
    /// Log `message` at info severity.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: OperationId::generate(),
            name: name.into(),
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    /// Adjust the severity.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

#[async_trait]
impl Operation for LogOperation {
    fn id(&self) -> &OperationId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: Value,
        foundry: &Foundry,
        _cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        let mut fields = LogFields::new();
        fields.insert(
            "execution_id".into(),
            json!(foundry.execution_id().as_str()),
        );
        if let Some(workflow) = foundry.current_workflow() {
            fields.insert("workflow".into(), json!(workflow.name()));
        }
        fields.insert("operation".into(), json!(self.name));
        fields.insert("input".into(), input.clone());
        foundry
            .logger()
            .log(self.level, &self.message, Some(&fields), None);
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn delegate_executes_and_restores() {
        let restored = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&restored);
        let op = DelegateOperation::new("charge", |_, _, _| Box::pin(async { Ok(json!("ok")) }))
            .with_restore(move |_, _, _| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            });
        assert!(op.supports_restore());

        let foundry = Foundry::new();
        let cancel = CancellationToken::new();
        let output = op.execute(Value::Null, &foundry, &cancel).await.unwrap();
        assert_eq!(output, json!("ok"));
        op.restore(output, &foundry, &cancel).await.unwrap();
        assert_eq!(restored.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn action_passes_input_through() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let op = ActionOperation::new("observe", move |input, _, _| {
            let sink = Arc::clone(&sink);
            let input = input.clone();
            Box::pin(async move {
                *sink.lock().unwrap() = Some(input);
                Ok(())
            })
        });
        assert!(!op.supports_restore());

        let foundry = Foundry::new();
        let cancel = CancellationToken::new();
        let output = op.execute(json!({"a": 1}), &foundry, &cancel).await.unwrap();
        assert_eq!(output, json!({"a": 1}));
        assert_eq!(*seen.lock().unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn conditional_restores_only_taken_branch() {
        let true_restores = Arc::new(AtomicUsize::new(0));
        let false_restores = Arc::new(AtomicUsize::new(0));

        let t = Arc::clone(&true_restores);
        let when_true: Arc<dyn Operation> =
            Arc::new(
                DelegateOperation::new("then", |_, _, _| Box::pin(async { Ok(json!("then")) }))
                    .with_restore(move |_, _, _| {
                        let t = Arc::clone(&t);
                        Box::pin(async move {
                            t.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                    }),
            );
        let f = Arc::clone(&false_restores);
        let when_false: Arc<dyn Operation> =
            Arc::new(
                DelegateOperation::new("else", |_, _, _| Box::pin(async { Ok(json!("else")) }))
                    .with_restore(move |_, _, _| {
                        let f = Arc::clone(&f);
                        Box::pin(async move {
                            f.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                    }),
            );

        let op = ConditionalOperation::new("pick", |_, input| Ok(input == &json!("go")), when_true)
            .with_else(when_false);
        assert!(op.supports_restore());

        let foundry = Foundry::new();
        let cancel = CancellationToken::new();
        let output = op.execute(json!("go"), &foundry, &cancel).await.unwrap();
        assert_eq!(output, json!("then"));

        op.restore(output, &foundry, &cancel).await.unwrap();
        assert_eq!(true_restores.load(Ordering::SeqCst), 1);
        assert_eq!(false_restores.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn conditional_without_else_passes_through() {
        let when_true: Arc<dyn Operation> = Arc::new(DelegateOperation::new("then", |_, _, _| {
            Box::pin(async { Ok(json!("then")) })
        }));
        let op = ConditionalOperation::new("pick", |_, _| Ok(false), when_true);

        let foundry = Foundry::new();
        let cancel = CancellationToken::new();
        let output = op.execute(json!(41), &foundry, &cancel).await.unwrap();
        assert_eq!(output, json!(41));
    }

    #[tokio::test]
    async fn for_each_maps_in_order_and_restores_in_reverse() {
        let trace = Arc::new(Mutex::new(Vec::new()));

        let exec_trace = Arc::clone(&trace);
        let restore_trace = Arc::clone(&trace);
        let inner: Arc<dyn Operation> = Arc::new(
            DelegateOperation::new("double", move |input, _, _| {
                let trace = Arc::clone(&exec_trace);
                Box::pin(async move {
                    trace.lock().unwrap().push(format!("x{input}"));
                    let n = input.as_i64().unwrap_or(0);
                    Ok(json!(n * 2))
                })
            })
            .with_restore(move |output, _, _| {
                let trace = Arc::clone(&restore_trace);
                Box::pin(async move {
                    trace.lock().unwrap().push(format!("r{output}"));
                    Ok(())
                })
            }),
        );

        let op = ForEachOperation::new("double-all", inner);
        let foundry = Foundry::new();
        let cancel = CancellationToken::new();
        let output = op.execute(json!([1, 2, 3]), &foundry, &cancel).await.unwrap();
        assert_eq!(output, json!([2, 4, 6]));

        op.restore(output, &foundry, &cancel).await.unwrap();
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["x1", "x2", "x3", "r6", "r4", "r2"]
        );
    }

    #[tokio::test]
    async fn for_each_rolls_back_partial_progress() {
        let restored = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&restored);
        let inner: Arc<dyn Operation> = Arc::new(
            DelegateOperation::new("checked", |input, _, _| {
                Box::pin(async move {
                    if input == json!(3) {
                        Err(OperationError::Failed("bad element".into()))
                    } else {
                        Ok(input)
                    }
                })
            })
            .with_restore(move |output, _, _| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.lock().unwrap().push(output);
                    Ok(())
                })
            }),
        );

        let op = ForEachOperation::new("iterate", inner);
        let foundry = Foundry::new();
        let cancel = CancellationToken::new();
        let result = op.execute(json!([1, 2, 3]), &foundry, &cancel).await;
        assert!(result.is_err());
        assert_eq!(*restored.lock().unwrap(), vec![json!(2), json!(1)]);
    }

    #[tokio::test]
    async fn for_each_rejects_non_array_input() {
        let inner: Arc<dyn Operation> = Arc::new(DelegateOperation::new("noop", |input, _, _| {
            Box::pin(async move { Ok(input) })
        }));
        let op = ForEachOperation::new("iterate", inner);
        let foundry = Foundry::new();
        let cancel = CancellationToken::new();
        assert!(matches!(
            op.execute(json!(5), &foundry, &cancel).await,
            Err(OperationError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn delay_observes_cancellation() {
        let op = DelayOperation::new("wait", Duration::from_secs(30));
        let foundry = Foundry::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            op.execute(Value::Null, &foundry, &cancel).await,
            Err(OperationError::Cancelled)
        ));
    }
}
