//! The logger port — the structured sink the engine and user operations
//! log through.
//!
//! The engine never logs to stdout or a concrete backend directly; it
//! goes through [`ForgeLogger`] so hosts can bridge to whatever they run
//! ([`NoopLogger`] here, a `tracing` bridge in the engine crate, or a
//! custom sink).

use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;

/// Severity levels accepted by the logger port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Trace,
    /// Debugging information.
    Debug,
    /// Normal operational messages.
    Info,
    /// Something unexpected but recoverable.
    Warn,
    /// A failure.
    Error,
    /// A failure the process likely cannot recover from.
    Critical,
}

/// Structured fields attached to a log line or scope.
pub type LogFields = HashMap<String, Value>;

/// RAII guard for a logging scope. Dropping it releases the scope.
///
/// Scopes nest: fields from every live scope are attached to each line
/// emitted until the guard is dropped.
pub struct LogScope(Option<Box<dyn FnOnce() + Send>>);

impl LogScope {
    /// Create a scope guard that runs `on_release` when dropped.
    pub fn new(on_release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(on_release)))
    }

    /// A scope guard that does nothing on release.
    pub fn noop() -> Self {
        Self(None)
    }
}

impl Drop for LogScope {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// Minimal structured-logging contract consumed by the engine.
///
/// Implementations decide formatting and destination. The provided
/// severity helpers all funnel into [`ForgeLogger::log`].
pub trait ForgeLogger: Send + Sync {
    /// Emit one line at the given severity with optional structured
    /// fields and an optional error.
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: Option<&LogFields>,
        error: Option<&(dyn Error + 'static)>,
    );

    /// Open a named scope whose fields attach to every line emitted
    /// until the returned guard is dropped. Scopes nest.
    fn begin_scope(&self, name: &str, fields: LogFields) -> LogScope;

    /// Log at trace severity.
    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message, None, None);
    }

    /// Log at debug severity.
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None, None);
    }

    /// Log at info severity.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None, None);
    }

    /// Log at warn severity.
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None, None);
    }

    /// Log at error severity.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, None, None);
    }

    /// Log at critical severity.
    fn critical(&self, message: &str) {
        self.log(LogLevel::Critical, message, None, None);
    }
}

/// A logger that discards everything. Substituted wherever no logger is
/// configured so the engine never has to check for one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl ForgeLogger for NoopLogger {
    fn log(
        &self,
        _level: LogLevel,
        _message: &str,
        _fields: Option<&LogFields>,
        _error: Option<&(dyn Error + 'static)>,
    ) {
    }

    fn begin_scope(&self, _name: &str, _fields: LogFields) -> LogScope {
        LogScope::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn noop_logger_accepts_everything() {
        let logger = NoopLogger;
        logger.info("hello");
        logger.critical("bad");
        let _scope = logger.begin_scope("s", LogFields::new());
    }

    #[test]
    fn scope_releases_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        {
            let _scope = LogScope::new(move || flag.store(true, Ordering::SeqCst));
            assert!(!released.load(Ordering::SeqCst));
        }
        assert!(released.load(Ordering::SeqCst));
    }
}
