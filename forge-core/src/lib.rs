//! # forge-core — Protocols and definition model for WorkflowForge
//!
//! This crate defines the pieces a workflow is made of and the contracts
//! the engine drives them through.
//!
//! ## The Protocols
//!
//! | Protocol | Trait | What it does |
//! |----------|-------|-------------|
//! | Operation | [`Operation`] | One unit of work, optionally compensatable |
//! | Middleware | [`OperationMiddleware`] | Wraps a single operation invocation |
//! | Logging | [`ForgeLogger`] | Structured sink with nestable scopes |
//! | Observation | [`WorkflowObserver`], [`OperationObserver`], [`CompensationObserver`] | Lifecycle events |
//!
//! ## The Model
//!
//! | Type | What it is |
//! |------|------------|
//! | [`Workflow`] | Immutable, ordered operation sequence with identity and version |
//! | [`WorkflowBuilder`] | Fluent assembly, validated at `build` |
//! | [`Foundry`] | The per-run execution context: properties, logger, options, middleware |
//! | [`ForgeOptions`] | The recognized execution toggles |
//!
//! ## Design Principle
//!
//! Ambient state is always passed explicitly — the foundry travels as a
//! parameter into every operation and middleware invocation, and so does
//! the cancellation token. Nothing is task-local.
//!
//! Operation inputs and outputs are `serde_json::Value`. Values cross a
//! polymorphic boundary (middleware, property storage, compensation
//! replay), and JSON is the interchange format the rest of the engine
//! already speaks; the typed convenience layer ([`TypedOperation`])
//! converts at the edge.

#![deny(missing_docs)]

pub mod builder;
pub mod builtin;
pub mod error;
pub mod event;
pub mod foundry;
pub mod id;
pub mod logger;
pub mod middleware;
pub mod operation;
pub mod options;
pub mod workflow;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use builder::WorkflowBuilder;
pub use builtin::{
    ActionOperation, ConditionalOperation, DelayOperation, DelegateOperation, ForEachOperation,
    LogOperation,
};
pub use error::{
    BuildError, FoundryError, ObserverError, OperationError, OperationFailed, RestoreFailed,
    SmithError,
};
pub use event::{
    CompensationEvent, CompensationObserver, OperationEvent, OperationObserver, WorkflowEvent,
    WorkflowObserver, dispatch_compensation_event, dispatch_operation_event,
    dispatch_workflow_event,
};
pub use foundry::{
    Foundry, LAST_COMPLETED_INDEX_KEY, LAST_COMPLETED_NAME_KEY, RESERVED_PROPERTY_PREFIX,
    operation_output_key,
};
pub use id::{ExecutionId, OperationId, WorkflowId};
pub use logger::{ForgeLogger, LogFields, LogLevel, LogScope, NoopLogger};
pub use middleware::{
    BoxedOutputFuture, BoxedRestoreFuture, Next, OperationMiddleware, middleware_fn,
};
pub use operation::{Operation, Typed, TypedOperation};
pub use options::ForgeOptions;
pub use workflow::Workflow;
