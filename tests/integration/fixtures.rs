//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A temporary shared state directory
//! - Worker identities that differ only by pid and session
//! - Remote calls that fail on a schedule

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use taskward::diagnostics::MemorySink;
use taskward::lock::{LockCoordinator, TaskLock, WorkerInfo};
use taskward::state::{write_json_atomic, StateStore};
use taskward::{Error, RetryPolicy};

/// A shared state directory, removed on drop.
pub struct SharedDir {
    pub temp_dir: TempDir,
}

impl SharedDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A coordinator for a worker with the given pid.
    pub fn worker(&self, pid: u32) -> LockCoordinator {
        LockCoordinator::new(self.path(), worker_info(pid))
    }

    /// A store whose diagnostics are collected in the returned sink.
    pub fn store(&self) -> (StateStore, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (StateStore::new(self.path(), sink.clone()), sink)
    }

    /// Overwrite the lock for `issue` as if `pid` had last heartbeated at `at`.
    pub fn plant_task_lock(&self, issue: u64, pid: u32, at: DateTime<Utc>) {
        let coordinator = self.worker(pid);
        let lock = TaskLock::new(issue, coordinator.worker(), at);
        write_json_atomic(&coordinator.task_lock_path(issue), &lock)
            .expect("Failed to write task lock");
    }
}

/// Identity of a simulated worker on a shared host.
pub fn worker_info(pid: u32) -> WorkerInfo {
    let info = WorkerInfo {
        session_id: format!("session-{}", pid),
        pid,
        hostname: "ci-host".to_string(),
        worker_id: None,
        repo_name: None,
    };
    info.with_worker_id(format!("worker-{}", pid))
        .with_repo_name("acme/widgets")
}

/// A policy with short delays and no jitter.
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_delays(100, 1_000)
        .with_jitter(0)
}

/// A remote call that fails with `message` for the first `failures` calls.
pub struct FlakyRemote {
    calls: AtomicU32,
    failures: u32,
    message: &'static str,
}

impl FlakyRemote {
    pub fn new(failures: u32, message: &'static str) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
            message,
        }
    }

    pub async fn call(&self) -> Result<String, Error> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(Error::Remote(self.message.to_string()))
        } else {
            Ok(format!("response #{}", n))
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A remote call that hangs for `delay` before answering.
pub async fn slow_remote(delay: Duration) -> Result<&'static str, Error> {
    tokio::time::sleep(delay).await;
    Ok("late")
}
