//! A logger that keeps everything it is given.

use crate::logger::{ForgeLogger, LogFields, LogLevel, LogScope};
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};

/// Captures log lines for assertions.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    /// Create an empty recording logger.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All recorded lines in emission order.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any line at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl ForgeLogger for RecordingLogger {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        _fields: Option<&LogFields>,
        error: Option<&(dyn Error + 'static)>,
    ) {
        let line = match error {
            Some(e) => format!("{message}: {e}"),
            None => message.to_string(),
        };
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, line));
    }

    fn begin_scope(&self, _name: &str, _fields: LogFields) -> LogScope {
        LogScope::noop()
    }
}
