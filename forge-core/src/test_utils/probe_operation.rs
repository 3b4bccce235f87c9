//! A scriptable operation that records how it was driven.

use crate::error::OperationError;
use crate::foundry::Foundry;
use crate::id::OperationId;
use crate::operation::Operation;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// An operation whose outcome is scripted up front and that records
/// every `execute` and `restore` call it receives.
///
/// A shared journal (one `Arc<Mutex<Vec<String>>>` across several
/// probes) captures the cross-operation call order as `execute:{name}` /
/// `restore:{name}` entries, which is what compensation-order tests
/// assert on.
pub struct ProbeOperation {
    id: OperationId,
    name: String,
    output: Value,
    fail_execute: Option<String>,
    fail_restore: Option<String>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
    executions: Mutex<Vec<Value>>,
    restores: Mutex<Vec<Value>>,
}

impl ProbeOperation {
    /// A probe that succeeds with null output.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: OperationId::generate(),
            name: name.into(),
            output: Value::Null,
            fail_execute: None,
            fail_restore: None,
            journal: None,
            executions: Mutex::new(Vec::new()),
            restores: Mutex::new(Vec::new()),
        }
    }

    /// Script the value `execute` returns.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    /// Script `execute` to fail with the given message.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_execute = Some(message.into());
        self
    }

    /// Script `restore` to fail with the given message.
    #[must_use]
    pub fn with_failing_restore(mut self, message: impl Into<String>) -> Self {
        self.fail_restore = Some(message.into());
        self
    }

    /// Share a journal that receives `execute:{name}` / `restore:{name}`
    /// entries in call order.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Inputs this probe's `execute` received, in order.
    pub fn inputs(&self) -> Vec<Value> {
        self.executions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Outputs this probe's `restore` received, in order.
    pub fn restored_outputs(&self) -> Vec<Value> {
        self.restores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn journal_push(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(entry);
        }
    }
}

#[async_trait]
impl Operation for ProbeOperation {
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
        _cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        self.executions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input);
        self.journal_push(format!("execute:{}", self.name));
        match &self.fail_execute {
            Some(message) => Err(OperationError::Failed(message.clone())),
            None => Ok(self.output.clone()),
        }
    }

    async fn restore(
        &self,
        output: Value,
        _foundry: &Foundry,
        _cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        self.restores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(output);
        self.journal_push(format!("restore:{}", self.name));
        match &self.fail_restore {
            Some(message) => Err(OperationError::Failed(message.clone())),
            None => Ok(()),
        }
    }

    fn supports_restore(&self) -> bool {
        true
    }
}
