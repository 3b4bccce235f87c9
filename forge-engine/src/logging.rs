//! Bridge from the logger port onto the `tracing` ecosystem.

use forge_core::logger::{ForgeLogger, LogFields, LogLevel, LogScope};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

struct ScopeFrame {
    id: u64,
    name: String,
    fields: LogFields,
}

/// A [`ForgeLogger`] that emits through `tracing` under the
/// `workflow_forge` target.
///
/// Scope fields are merged (inner scopes win on key collision) and
/// attached to every line as a single JSON `fields` value, with the
/// scope names joined into a `scope` path. Critical maps to
/// `tracing::error!` with a `critical` marker field.
#[derive(Default)]
pub struct TracingLogger {
    scopes: Arc<Mutex<Vec<ScopeFrame>>>,
    next_scope_id: AtomicU64,
}

impl TracingLogger {
    /// Create a bridge with no open scopes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, extra: Option<&LogFields>) -> (String, String) {
        let frames = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut merged = LogFields::new();
        let mut path = Vec::with_capacity(frames.len());
        for frame in frames.iter() {
            merged.extend(frame.fields.clone());
            path.push(frame.name.clone());
        }
        drop(frames);
        if let Some(extra) = extra {
            merged.extend(extra.clone());
        }
        let fields = serde_json::to_string(&merged).unwrap_or_default();
        (path.join("/"), fields)
    }
}

impl ForgeLogger for TracingLogger {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: Option<&LogFields>,
        error: Option<&(dyn Error + 'static)>,
    ) {
        let (scope, fields) = self.snapshot(fields);
        let text = match error {
            Some(e) => format!("{message}: {e}"),
            None => message.to_string(),
        };
        match level {
            LogLevel::Trace => {
                tracing::trace!(target: "workflow_forge", scope = %scope, fields = %fields, "{text}");
            }
            LogLevel::Debug => {
                tracing::debug!(target: "workflow_forge", scope = %scope, fields = %fields, "{text}");
            }
            LogLevel::Info => {
                tracing::info!(target: "workflow_forge", scope = %scope, fields = %fields, "{text}");
            }
            LogLevel::Warn => {
                tracing::warn!(target: "workflow_forge", scope = %scope, fields = %fields, "{text}");
            }
            LogLevel::Error => {
                tracing::error!(target: "workflow_forge", scope = %scope, fields = %fields, "{text}");
            }
            LogLevel::Critical => {
                tracing::error!(target: "workflow_forge", critical = true, scope = %scope, fields = %fields, "{text}");
            }
        }
    }

    fn begin_scope(&self, name: &str, fields: LogFields) -> LogScope {
        let id = self.next_scope_id.fetch_add(1, Ordering::Relaxed);
        self.scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ScopeFrame {
                id,
                name: name.to_string(),
                fields,
            });
        let scopes = Arc::clone(&self.scopes);
        LogScope::new(move || {
            scopes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|frame| frame.id != id);
        })
    }
}
