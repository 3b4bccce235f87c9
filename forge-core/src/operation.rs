//! The Operation protocol — the polymorphic unit of work.

use crate::error::OperationError;
use crate::foundry::Foundry;
use crate::id::OperationId;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A single executable unit of work, optionally compensatable.
///
/// Inputs and outputs are `serde_json::Value`. This is an intentional
/// choice: values cross a polymorphic boundary (middleware, property
/// storage, compensation replay), and JSON is the interchange format the
/// rest of the engine already speaks. Use [`TypedOperation`] for a
/// statically-typed veneer over the same contract.
///
/// The orchestrator decides what each operation receives as input (see
/// `ForgeOptions::output_chaining`) and records whatever it returns.
/// `execute` and `restore` are invoked at most once per run.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Stable identity of this operation instance.
    fn id(&self) -> &OperationId;

    /// Human-readable name. Must be non-empty; validated at build time.
    fn name(&self) -> &str;

    /// Perform the work. `input` may be null. Cooperative cancellation:
    /// an operation that never checks `cancel` runs to completion.
    async fn execute(
        &self,
        input: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError>;

    /// Undo previously-completed work. `output` is exactly the value this
    /// operation returned from `execute` in the same run. The default is
    /// a no-op so operations without side effects need not override.
    async fn restore(
        &self,
        output: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        let _ = (output, foundry, cancel);
        Ok(())
    }

    /// Advisory: whether this operation overrides [`Operation::restore`].
    /// Compensation does not consult this — no-op restores are harmless —
    /// but workflows aggregate it into their restore-capability flag.
    fn supports_restore(&self) -> bool {
        false
    }
}

/// Statically-typed form of [`Operation`].
///
/// A pure compile-time convenience: [`Typed`] adapts any implementation
/// into a dynamic [`Operation`] by serde-converting at the boundary, and
/// the result is behaviourally indistinguishable from a hand-written
/// dynamic operation.
#[async_trait]
pub trait TypedOperation: Send + Sync {
    /// The deserialized input type.
    type Input: DeserializeOwned + Send;
    /// The serialized output type. `DeserializeOwned` because restore
    /// receives the recorded output back.
    type Output: Serialize + DeserializeOwned + Send;

    /// Stable identity of this operation instance.
    fn id(&self) -> &OperationId;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Perform the work against a typed input.
    async fn execute(
        &self,
        input: Self::Input,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Self::Output, OperationError>;

    /// Undo previously-completed work. Default no-op.
    async fn restore(
        &self,
        output: Self::Output,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        let _ = (output, foundry, cancel);
        Ok(())
    }

    /// Advisory restore-capability flag, as on [`Operation`].
    fn supports_restore(&self) -> bool {
        false
    }
}

/// Adapter that exposes a [`TypedOperation`] as a dynamic [`Operation`].
pub struct Typed<T>(pub T);

#[async_trait]
impl<T: TypedOperation> Operation for Typed<T> {
    fn id(&self) -> &OperationId {
        self.0.id()
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    async fn execute(
        &self,
        input: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        let typed_input: T::Input = serde_json::from_value(input).map_err(|e| {
            OperationError::Failed(format!(
                "operation '{}' received an incompatible input: {e}",
                self.0.name()
            ))
        })?;
        let output = self.0.execute(typed_input, foundry, cancel).await?;
        serde_json::to_value(output)
            .map_err(|e| OperationError::Failed(format!("output serialization failed: {e}")))
    }

    async fn restore(
        &self,
        output: Value,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        let typed_output: T::Output = serde_json::from_value(output).map_err(|e| {
            OperationError::Failed(format!(
                "operation '{}' received an incompatible output to restore: {e}",
                self.0.name()
            ))
        })?;
        self.0.restore(typed_output, foundry, cancel).await
    }

    fn supports_restore(&self) -> bool {
        self.0.supports_restore()
    }
}
