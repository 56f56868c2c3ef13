//! Injectable sink for validation and lock diagnostics.
//!
//! Components that can report on the health of persisted state receive a sink
//! explicitly instead of consulting a process-wide verbose flag.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::{twlog_debug, twlog_warn};

/// One diagnostic about a persisted document.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// File the document was read from, when known.
    pub file_path: Option<PathBuf>,
    /// Field path inside the document (`""` for the document itself).
    pub path: String,
    pub message: String,
    /// True when the problem was repaired with a default.
    pub recovered: bool,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file_path {
            write!(f, "{}: ", file.display())?;
        }
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path)?;
        }
        write!(f, "{}", self.message)?;
        if self.recovered {
            write!(f, " (recovered)")?;
        }
        Ok(())
    }
}

pub trait DiagnosticsSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn emit(&self, _diagnostic: Diagnostic) {}
}

/// Forwards diagnostics to the operator log. Recoveries go to DEBUG,
/// unrecovered failures to WARN.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn emit(&self, diagnostic: Diagnostic) {
        if diagnostic.recovered {
            twlog_debug!("state: {}", diagnostic);
        } else {
            twlog_warn!("state: {}", diagnostic);
        }
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticsSink for MemorySink {
    fn emit(&self, diagnostic: Diagnostic) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(diagnostic);
        }
    }
}
