//! File-backed store for session stats, task metrics and progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::atomic::{backup, create_json_exclusive, read_json, remove_if_exists, write_json_atomic};
use super::records::{Progress, SessionStats, TaskMetrics};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::schema::{validate, validate_array, validate_array_as, validate_as, SchemaName, ValidateOptions};
use crate::{twlog_debug, Error, Result};

pub const SESSION_STATS_FILE: &str = "session-stats.json";
pub const TASK_METRICS_FILE: &str = "task-metrics.json";
pub const PROGRESS_FILE: &str = "progress.json";

/// Report a file that could not be read or parsed at all.
fn report_unreadable(diagnostics: &dyn DiagnosticsSink, path: &Path, err: &Error) {
    diagnostics.emit(Diagnostic {
        file_path: Some(path.to_path_buf()),
        path: String::new(),
        message: format!("Unreadable state file: {}", err),
        recovered: false,
    });
}

/// Read a single-record file, validating with recovery.
///
/// Missing, unreadable and irrecoverably invalid files all yield `None`.
pub(crate) fn load_document<T: DeserializeOwned>(
    path: &Path,
    name: SchemaName,
    diagnostics: &dyn DiagnosticsSink,
) -> Option<T> {
    let raw = match read_json(path) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            report_unreadable(diagnostics, path, &e);
            return None;
        }
    };

    let options = ValidateOptions::recovering()
        .with_file(path)
        .with_diagnostics(diagnostics);
    validate_as::<T>(&raw, name, &options).data
}

/// Read an array file, dropping elements that cannot be recovered.
pub(crate) fn load_records<T: DeserializeOwned>(
    path: &Path,
    name: SchemaName,
    diagnostics: &dyn DiagnosticsSink,
) -> Vec<T> {
    let raw = match read_json(path) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            report_unreadable(diagnostics, path, &e);
            return Vec::new();
        }
    };

    let options = ValidateOptions::recovering()
        .with_file(path)
        .with_diagnostics(diagnostics);
    validate_array_as::<T>(&raw, name, &options)
        .data
        .unwrap_or_default()
}

fn rejection(name: SchemaName, errors: &[crate::schema::FieldError]) -> Error {
    let details = errors
        .iter()
        .filter(|e| !e.recovered)
        .map(|e| {
            if e.path.is_empty() {
                e.message.clone()
            } else {
                format!("{}: {}", e.path, e.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ");
    Error::Validation(format!("refusing to write invalid {}: {}", name, details))
}

/// Validate strictly, then write atomically. Invalid data is never persisted.
pub(crate) fn save_document<T: Serialize>(path: &Path, name: SchemaName, value: &T) -> Result<()> {
    let raw = serde_json::to_value(value)?;
    let result = validate(&raw, name.schema(), &ValidateOptions::strict());
    if !result.valid {
        return Err(rejection(name, &result.errors));
    }
    write_json_atomic(path, &raw)
}

/// Validate strictly, then publish only if `path` does not exist yet.
pub(crate) fn create_document<T: Serialize>(path: &Path, name: SchemaName, value: &T) -> Result<bool> {
    let raw = serde_json::to_value(value)?;
    let result = validate(&raw, name.schema(), &ValidateOptions::strict());
    if !result.valid {
        return Err(rejection(name, &result.errors));
    }
    create_json_exclusive(path, &raw)
}

fn save_records<T: Serialize>(path: &Path, name: SchemaName, records: &[T]) -> Result<()> {
    let raw = serde_json::to_value(records)?;
    let result = validate_array(&raw, name.schema(), &ValidateOptions::strict());
    if !result.valid {
        return Err(rejection(name, &result.errors));
    }
    backup(path)?;
    write_json_atomic(path, &raw)
}

/// Schema-validated state files in one directory.
#[derive(Clone)]
pub struct StateStore {
    dir: PathBuf,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            dir: dir.into(),
            diagnostics,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_stats_path(&self) -> PathBuf {
        self.dir.join(SESSION_STATS_FILE)
    }

    pub fn task_metrics_path(&self) -> PathBuf {
        self.dir.join(TASK_METRICS_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    pub fn load_session_stats(&self) -> Vec<SessionStats> {
        load_records(
            &self.session_stats_path(),
            SchemaName::SessionStats,
            self.diagnostics.as_ref(),
        )
    }

    pub fn save_session_stats(&self, stats: &[SessionStats]) -> Result<()> {
        twlog_debug!("StateStore::save_session_stats count={}", stats.len());
        save_records(&self.session_stats_path(), SchemaName::SessionStats, stats)
    }

    /// Read-modify-write append. Not safe against a concurrent appender in
    /// another process; the later writer wins.
    pub fn append_session_stats(&self, stats: SessionStats) -> Result<()> {
        let mut all = self.load_session_stats();
        all.push(stats);
        self.save_session_stats(&all)
    }

    pub fn load_task_metrics(&self) -> Vec<TaskMetrics> {
        load_records(
            &self.task_metrics_path(),
            SchemaName::TaskMetrics,
            self.diagnostics.as_ref(),
        )
    }

    pub fn save_task_metrics(&self, metrics: &[TaskMetrics]) -> Result<()> {
        twlog_debug!("StateStore::save_task_metrics count={}", metrics.len());
        save_records(&self.task_metrics_path(), SchemaName::TaskMetrics, metrics)
    }

    pub fn append_task_metrics(&self, metrics: TaskMetrics) -> Result<()> {
        let mut all = self.load_task_metrics();
        all.push(metrics);
        self.save_task_metrics(&all)
    }

    pub fn load_progress(&self) -> Option<Progress> {
        load_document(
            &self.progress_path(),
            SchemaName::Progress,
            self.diagnostics.as_ref(),
        )
    }

    pub fn save_progress(&self, progress: &Progress) -> Result<()> {
        save_document(&self.progress_path(), SchemaName::Progress, progress)
    }

    pub fn clear_progress(&self) -> Result<()> {
        remove_if_exists(&self.progress_path()).map(|_| ())
    }
}
