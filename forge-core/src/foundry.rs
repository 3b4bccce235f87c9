//! The Foundry — the per-run execution context.
//!
//! A foundry carries everything ambient to one execution: a unique
//! execution id, a concurrency-safe property map, the logger, an opaque
//! service handle for user code, the execution options, the middleware
//! list, and operation-level event dispatch. It is always passed
//! explicitly — never reified as task-local state.
//!
//! Multiple concurrent executions must use distinct foundries; a second
//! `try_begin` on a foundry that is already executing fails fast.

use crate::error::FoundryError;
use crate::event::{OperationEvent, OperationObserver, dispatch_operation_event};
use crate::id::ExecutionId;
use crate::logger::{ForgeLogger, NoopLogger};
use crate::middleware::OperationMiddleware;
use crate::operation::Operation;
use crate::options::ForgeOptions;
use crate::workflow::Workflow;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Property namespace reserved for the orchestrator. User code must not
/// write keys under this prefix.
pub const RESERVED_PROPERTY_PREFIX: &str = "Operation.";

/// Key holding the index of the most recently completed operation.
pub const LAST_COMPLETED_INDEX_KEY: &str = "Operation.LastCompletedIndex";

/// Key holding the name of the most recently completed operation.
pub const LAST_COMPLETED_NAME_KEY: &str = "Operation.LastCompletedName";

/// Key under which the output of the operation at `index` named `name`
/// is recorded.
pub fn operation_output_key(index: usize, name: &str) -> String {
    format!("Operation.{index}:{name}.Output")
}

/// The per-run execution context.
///
/// Each foundry owns its property map outright — two foundries never
/// share one, so property writes in one are invisible in the other.
/// Property access is safe from any thread with last-writer-wins
/// semantics per key; there is no compound-operation atomicity.
///
/// The middleware and operation lists are mutable only while no
/// execution is in flight; during a run they are frozen and mutation
/// fails with [`FoundryError::Frozen`].
pub struct Foundry {
    execution_id: ExecutionId,
    current_workflow: RwLock<Option<Arc<Workflow>>>,
    properties: DashMap<String, Value>,
    logger: Arc<dyn ForgeLogger>,
    services: Option<Arc<dyn Any + Send + Sync>>,
    options: ForgeOptions,
    middleware: RwLock<Vec<Arc<dyn OperationMiddleware>>>,
    operations: RwLock<Vec<Arc<dyn Operation>>>,
    observers: RwLock<Vec<Arc<dyn OperationObserver>>>,
    executing: AtomicBool,
    disposed: AtomicBool,
}

impl Foundry {
    /// Create a foundry with a fresh execution id, a no-op logger, and
    /// default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            execution_id: ExecutionId::generate(),
            current_workflow: RwLock::new(None),
            properties: DashMap::new(),
            logger: Arc::new(NoopLogger),
            services: None,
            options: ForgeOptions::default(),
            middleware: RwLock::new(Vec::new()),
            operations: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            executing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Replace the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn ForgeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: ForgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach an opaque service handle for user code. The engine never
    /// reads or resolves anything from it.
    #[must_use]
    pub fn with_services<T: Send + Sync + 'static>(self, services: Arc<T>) -> Self {
        let erased: Arc<dyn Any + Send + Sync> = services;
        self.with_service_handle(erased)
    }

    /// Attach an already-erased service handle. Orchestrators and
    /// factories use this to hand one handle to many foundries.
    #[must_use]
    pub fn with_service_handle(mut self, services: Arc<dyn Any + Send + Sync>) -> Self {
        self.services = Some(services);
        self
    }

    /// This foundry's unique execution id.
    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// The logger. Never absent — a no-op logger stands in by default.
    pub fn logger(&self) -> &Arc<dyn ForgeLogger> {
        &self.logger
    }

    /// The execution options. Read-only.
    pub fn options(&self) -> &ForgeOptions {
        &self.options
    }

    /// Downcast the service handle, if one of type `T` was attached.
    pub fn services<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .as_ref()
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// The workflow currently executing against this foundry, if any.
    pub fn current_workflow(&self) -> Option<Arc<Workflow>> {
        self.read(&self.current_workflow).clone()
    }

    /// Whether an execution is in flight (the freeze flag).
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// Whether this foundry has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // --- Properties ---

    /// Store a property. Overwrites any previous value for the key.
    pub fn set_property(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), FoundryError> {
        self.ensure_live()?;
        let key = key.into();
        Self::validate_key(&key)?;
        self.properties.insert(key, value);
        Ok(())
    }

    /// Read a property. `Ok(None)` when the key is absent.
    pub fn property(&self, key: &str) -> Result<Option<Value>, FoundryError> {
        self.ensure_live()?;
        Self::validate_key(key)?;
        Ok(self.properties.get(key).map(|entry| entry.value().clone()))
    }

    /// Read a property and deserialize it. `Ok(None)` when the key is
    /// absent; [`FoundryError::TypeMismatch`] when the stored value does
    /// not deserialize as `T`.
    pub fn property_as<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, FoundryError> {
        match self.property(key)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| FoundryError::TypeMismatch {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Read a property that must exist.
    ///
    /// # Errors
    ///
    /// [`FoundryError::NotFound`] when the key is absent.
    pub fn require_property(&self, key: &str) -> Result<Value, FoundryError> {
        self.property(key)?
            .ok_or_else(|| FoundryError::NotFound(key.to_string()))
    }

    /// Remove a property, returning the previous value if any.
    pub fn remove_property(&self, key: &str) -> Result<Option<Value>, FoundryError> {
        self.ensure_live()?;
        Self::validate_key(key)?;
        Ok(self.properties.remove(key).map(|(_, value)| value))
    }

    /// Whether a property exists.
    pub fn contains_property(&self, key: &str) -> Result<bool, FoundryError> {
        self.ensure_live()?;
        Self::validate_key(key)?;
        Ok(self.properties.contains_key(key))
    }

    /// Number of stored properties.
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    // --- Middleware, operations, observers ---

    /// Add middleware to the end of the pipeline. The first added is the
    /// outermost wrapper at execution time.
    pub fn add_middleware(
        &self,
        middleware: Arc<dyn OperationMiddleware>,
    ) -> Result<(), FoundryError> {
        self.ensure_mutable()?;
        self.write(&self.middleware).push(middleware);
        Ok(())
    }

    /// Snapshot of the middleware pipeline, in registration order.
    pub fn middleware(&self) -> Vec<Arc<dyn OperationMiddleware>> {
        self.read(&self.middleware).clone()
    }

    /// Append an operation to this foundry's own list — the advanced
    /// path where a foundry is forged as a mini-workflow in its own
    /// right.
    pub fn add_operation(&self, operation: Arc<dyn Operation>) -> Result<(), FoundryError> {
        self.ensure_mutable()?;
        self.write(&self.operations).push(operation);
        Ok(())
    }

    /// Snapshot of this foundry's own operation list.
    pub fn operations(&self) -> Vec<Arc<dyn Operation>> {
        self.read(&self.operations).clone()
    }

    /// Register an operation-lifecycle observer.
    pub fn add_observer(&self, observer: Arc<dyn OperationObserver>) -> Result<(), FoundryError> {
        self.ensure_mutable()?;
        self.write(&self.observers).push(observer);
        Ok(())
    }

    /// Emit one operation event to every registered observer.
    /// Synchronous; observer errors are logged and swallowed. Called by
    /// orchestrators at operation transition points.
    pub fn emit(&self, event: &OperationEvent<'_>) {
        let observers = self.read(&self.observers).clone();
        dispatch_operation_event(&observers, self.logger.as_ref(), event);
    }

    // --- Execution lifecycle ---

    /// Try to enter the executing state for `workflow`.
    ///
    /// Returns `Ok(false)` when an execution is already in flight —
    /// concurrent executions on one foundry fail fast rather than
    /// serialize.
    ///
    /// # Errors
    ///
    /// [`FoundryError::Disposed`] when the foundry has been disposed.
    pub fn try_begin(&self, workflow: Arc<Workflow>) -> Result<bool, FoundryError> {
        self.ensure_live()?;
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        *self.write(&self.current_workflow) = Some(workflow);
        Ok(true)
    }

    /// Leave the executing state: clear the current workflow and lower
    /// the freeze flag.
    pub fn finish(&self) {
        *self.write(&self.current_workflow) = None;
        self.executing.store(false, Ordering::Release);
    }

    /// Dispose the foundry. Idempotent. Afterwards every property and
    /// list access fails with [`FoundryError::Disposed`] — reads
    /// included, so behaviour is uniform.
    ///
    /// A foundry owns its middleware, observers, and properties, but not
    /// its operations' definitions — those belong to the workflow.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.properties.clear();
        self.write(&self.middleware).clear();
        self.write(&self.operations).clear();
        self.write(&self.observers).clear();
        *self.write(&self.current_workflow) = None;
        self.executing.store(false, Ordering::Release);
    }

    // --- Internals ---

    fn validate_key(key: &str) -> Result<(), FoundryError> {
        if key.trim().is_empty() {
            return Err(FoundryError::InvalidKey);
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), FoundryError> {
        if self.is_disposed() {
            return Err(FoundryError::Disposed);
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), FoundryError> {
        self.ensure_live()?;
        if self.is_executing() {
            return Err(FoundryError::Frozen);
        }
        Ok(())
    }

    fn read<'a, T>(&self, lock: &'a RwLock<T>) -> std::sync::RwLockReadGuard<'a, T> {
        lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write<'a, T>(&self, lock: &'a RwLock<T>) -> std::sync::RwLockWriteGuard<'a, T> {
        lock.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Foundry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Foundry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Foundry")
            .field("execution_id", &self.execution_id)
            .field("properties", &self.properties.len())
            .field("executing", &self.is_executing())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
