//! Advisory lock files coordinating worker processes.
//!
//! Locks are schema-validated JSON files in a shared directory:
//!
//! - `task-<issue>.lock`: the worker currently executing an issue. The holder
//!   rewrites `last_heartbeat` periodically; a lock whose heartbeat is older
//!   than the staleness threshold is treated as abandoned and may be removed
//!   and reclaimed by another worker.
//! - `pause.lock`: its existence pauses every worker.
//! - `approval-<issue>.lock`: a human approval gate for one issue.
//!
//! This is best-effort mutual exclusion, not consensus. There is no fencing
//! token: a holder that was presumed dead and reclaimed can still write after
//! it wakes up. The window is accepted because the remote operations a task
//! performs are retried and idempotent.

mod approval;
mod heartbeat;
mod pause;
mod task;

pub use approval::{ApprovalLock, ApprovalRequest, ApprovalStatus};
pub use heartbeat::HeartbeatHandle;
pub use pause::PauseLock;
pub use task::TaskLock;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::{DiagnosticsSink, NullSink};
use crate::{twlog_warn, Result};

/// Default heartbeat age after which a task lock is considered abandoned.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 300;

/// Default period between heartbeats of a held task lock.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

pub const PAUSE_LOCK_FILE: &str = "pause.lock";
const TASK_LOCK_PREFIX: &str = "task-";
const APPROVAL_LOCK_PREFIX: &str = "approval-";
const LOCK_SUFFIX: &str = ".lock";

/// Identity written into task locks by the claiming worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub session_id: String,
    pub pid: u32,
    pub hostname: String,
    pub worker_id: Option<String>,
    pub repo_name: Option<String>,
}

impl WorkerInfo {
    /// Identity of the current process.
    pub fn current(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            pid: std::process::id(),
            hostname: local_hostname(),
            worker_id: None,
            repo_name: None,
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_repo_name(mut self, repo_name: impl Into<String>) -> Self {
        self.repo_name = Some(repo_name.into());
        self
    }

    /// Whether `lock` was written by this worker.
    pub fn owns(&self, lock: &TaskLock) -> bool {
        lock.pid == self.pid && lock.hostname == self.hostname && lock.session_id == self.session_id
    }
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Claim, heartbeat and release locks in one state directory.
#[derive(Clone)]
pub struct LockCoordinator {
    dir: PathBuf,
    worker: WorkerInfo,
    stale_after: Duration,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl LockCoordinator {
    pub fn new(dir: impl Into<PathBuf>, worker: WorkerInfo) -> Self {
        Self {
            dir: dir.into(),
            worker,
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            diagnostics: Arc::new(NullSink),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn worker(&self) -> &WorkerInfo {
        &self.worker
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn task_lock_path(&self, issue: u64) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", TASK_LOCK_PREFIX, issue, LOCK_SUFFIX))
    }

    pub fn approval_lock_path(&self, issue: u64) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", APPROVAL_LOCK_PREFIX, issue, LOCK_SUFFIX))
    }

    pub fn pause_lock_path(&self) -> PathBuf {
        self.dir.join(PAUSE_LOCK_FILE)
    }

    fn diagnostics(&self) -> &dyn DiagnosticsSink {
        self.diagnostics.as_ref()
    }

    /// Lock files named `<prefix><issue>.lock`, sorted by issue number.
    fn lock_files(&self, prefix: &str) -> Result<Vec<(u64, PathBuf)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let issue = name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(LOCK_SUFFIX))
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(issue) = issue {
                files.push((issue, entry.path()));
            }
        }
        files.sort_by_key(|(issue, _)| *issue);
        Ok(files)
    }

    /// Lock files, or an empty list with a warning if the directory is unreadable.
    fn lock_files_or_empty(&self, prefix: &str) -> Vec<(u64, PathBuf)> {
        self.lock_files(prefix).unwrap_or_else(|e| {
            twlog_warn!("Cannot list locks in {}: {}", self.dir.display(), e);
            Vec::new()
        })
    }

    /// Age of a file by modification time. `None` if it no longer exists.
    fn file_age(path: &Path) -> Result<Option<Duration>> {
        match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => Ok(Some(modified.elapsed().unwrap_or(Duration::ZERO))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
