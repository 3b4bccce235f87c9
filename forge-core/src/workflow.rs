//! The immutable workflow definition.

use crate::id::WorkflowId;
use crate::operation::Operation;
use std::sync::Arc;

/// An immutable, ordered sequence of operations with identity, name, and
/// version.
///
/// Built via [`crate::builder::WorkflowBuilder`]; the operation sequence
/// is frozen at build time and never mutated. A definition may be
/// executed any number of times, concurrently, against distinct
/// foundries — it carries no per-run state.
pub struct Workflow {
    id: WorkflowId,
    name: String,
    description: Option<String>,
    version: String,
    operations: Vec<Arc<dyn Operation>>,
    supports_restore: bool,
}

impl Workflow {
    pub(crate) fn new(
        name: String,
        description: Option<String>,
        version: String,
        operations: Vec<Arc<dyn Operation>>,
    ) -> Self {
        let supports_restore = operations.iter().any(|op| op.supports_restore());
        Self {
            id: WorkflowId::generate(),
            name,
            description,
            version,
            operations,
            supports_restore,
        }
    }

    /// Unique identifier, generated at build time.
    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    /// Workflow name. Non-empty.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The frozen operation sequence, in execution order.
    pub fn operations(&self) -> &[Arc<dyn Operation>] {
        &self.operations
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the workflow has no operations. Always false for built
    /// workflows — the builder rejects empty sequences.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Advisory flag: true iff at least one operation overrides restore.
    /// Compensation is attempted regardless; no-op restores are harmless.
    pub fn supports_restore(&self) -> bool {
        self.supports_restore
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("operations", &self.operations.len())
            .field("supports_restore", &self.supports_restore)
            .finish()
    }
}
