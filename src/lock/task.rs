//! Task locks: one live holder per issue, proven by heartbeats.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{LockCoordinator, WorkerInfo, TASK_LOCK_PREFIX};
use crate::schema::SchemaName;
use crate::state::{create_document, load_document, remove_if_exists, save_document};
use crate::{twlog, twlog_debug, twlog_warn, Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLock {
    pub issue_number: u64,
    pub session_id: String,
    pub pid: u32,
    pub hostname: String,
    pub locked_at: DateTime<Utc>,
    /// Never moves backwards while the lock is held.
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskLock {
    pub fn new(issue_number: u64, worker: &WorkerInfo, now: DateTime<Utc>) -> Self {
        Self {
            issue_number,
            session_id: worker.session_id.clone(),
            pid: worker.pid,
            hostname: worker.hostname.clone(),
            locked_at: now,
            last_heartbeat: now,
            worker_id: worker.worker_id.clone(),
            repo_name: worker.repo_name.clone(),
            extra: Map::new(),
        }
    }

    /// Human-readable owner, used in logs and errors.
    pub fn holder(&self) -> String {
        format!(
            "pid {} on {} (session {})",
            self.pid, self.hostname, self.session_id
        )
    }
}

/// What a claimant found at a task lock path.
enum Occupant {
    Vacant,
    Mine(TaskLock),
    Live(TaskLock),
    Stale(TaskLock),
    /// Present but unreadable or invalid, with a fresh modification time.
    Unreadable,
    /// Present but unreadable or invalid, untouched for longer than the threshold.
    UnreadableStale,
}

impl LockCoordinator {
    /// Read and validate the lock for `issue`. `None` when absent or irrecoverable.
    pub fn load_task_lock(&self, issue: u64) -> Option<TaskLock> {
        load_document(
            &self.task_lock_path(issue),
            SchemaName::TaskLock,
            self.diagnostics(),
        )
    }

    /// Every readable task lock in the directory, ordered by issue number.
    pub fn list_task_locks(&self) -> Vec<TaskLock> {
        self.lock_files_or_empty(TASK_LOCK_PREFIX)
            .into_iter()
            .filter_map(|(_, path)| load_document(&path, SchemaName::TaskLock, self.diagnostics()))
            .collect()
    }

    /// Whether the heartbeat is older than the staleness threshold.
    pub fn is_stale(&self, lock: &TaskLock) -> bool {
        self.is_stale_at(lock, Utc::now())
    }

    /// Heartbeats in the future never count as stale.
    pub fn is_stale_at(&self, lock: &TaskLock, now: DateTime<Utc>) -> bool {
        match (now - lock.last_heartbeat).to_std() {
            Ok(age) => age > self.stale_after,
            Err(_) => false,
        }
    }

    fn inspect(&self, issue: u64, now: DateTime<Utc>) -> Result<Occupant> {
        let path = self.task_lock_path(issue);
        if !path.exists() {
            return Ok(Occupant::Vacant);
        }

        match self.load_task_lock(issue) {
            Some(lock) if self.worker.owns(&lock) => Ok(Occupant::Mine(lock)),
            Some(lock) if self.is_stale_at(&lock, now) => Ok(Occupant::Stale(lock)),
            Some(lock) => Ok(Occupant::Live(lock)),
            None => match Self::file_age(&path)? {
                None => Ok(Occupant::Vacant),
                Some(age) if age > self.stale_after => Ok(Occupant::UnreadableStale),
                Some(_) => Ok(Occupant::Unreadable),
            },
        }
    }

    /// Try to take the lock for `issue`.
    ///
    /// Returns `true` if this worker now holds it (including when it already
    /// did), `false` if another live worker holds it or won a concurrent
    /// claim. A stale lock is deleted and reclaimed. Local I/O failures are
    /// returned as errors.
    pub fn claim_task(&self, issue: u64) -> Result<bool> {
        let path = self.task_lock_path(issue);
        let now = Utc::now();

        match self.inspect(issue, now)? {
            Occupant::Vacant => {}
            Occupant::Mine(lock) => {
                twlog_debug!("claim_task: issue #{} already held by this worker", issue);
                self.write_heartbeat(&path, lock, now)?;
                return Ok(true);
            }
            Occupant::Live(lock) => {
                twlog_debug!("claim_task: issue #{} held by {}", issue, lock.holder());
                return Ok(false);
            }
            Occupant::Unreadable => {
                twlog_debug!("claim_task: issue #{} has an unreadable fresh lock", issue);
                return Ok(false);
            }
            Occupant::Stale(lock) => {
                twlog_warn!(
                    "Reclaiming stale lock for issue #{} from {} (last heartbeat {})",
                    issue,
                    lock.holder(),
                    lock.last_heartbeat
                );
                remove_if_exists(&path)?;
            }
            Occupant::UnreadableStale => {
                twlog_warn!("Removing abandoned unreadable lock for issue #{}", issue);
                remove_if_exists(&path)?;
            }
        }

        let lock = TaskLock::new(issue, &self.worker, now);
        let claimed = create_document(&path, SchemaName::TaskLock, &lock)?;
        if claimed {
            twlog!("Claimed issue #{} ({})", issue, lock.holder());
        } else {
            twlog_debug!("claim_task: lost race for issue #{}", issue);
        }
        Ok(claimed)
    }

    /// Refresh `last_heartbeat` of a lock held by this worker.
    pub fn heartbeat(&self, issue: u64) -> Result<()> {
        let path = self.task_lock_path(issue);
        let Some(lock) = self.load_task_lock(issue) else {
            let holder = if path.exists() {
                "unreadable lock file"
            } else {
                "none"
            };
            return Err(Error::LockNotHeld {
                issue,
                holder: holder.to_string(),
            });
        };

        if !self.worker.owns(&lock) {
            return Err(Error::LockNotHeld {
                issue,
                holder: lock.holder(),
            });
        }

        self.write_heartbeat(&path, lock, Utc::now())
    }

    fn write_heartbeat(&self, path: &Path, mut lock: TaskLock, now: DateTime<Utc>) -> Result<()> {
        lock.last_heartbeat = lock.last_heartbeat.max(now);
        save_document(path, SchemaName::TaskLock, &lock)
    }

    /// Drop the lock for `issue` if this worker holds it.
    ///
    /// Absent locks are a no-op. A lock held by someone else is left alone.
    pub fn release_task(&self, issue: u64) -> Result<()> {
        let path = self.task_lock_path(issue);
        match self.load_task_lock(issue) {
            Some(lock) if self.worker.owns(&lock) => {
                remove_if_exists(&path)?;
                twlog!("Released issue #{}", issue);
            }
            Some(lock) => {
                twlog_warn!(
                    "Not releasing issue #{}: held by {}",
                    issue,
                    lock.holder()
                );
            }
            None if path.exists() => {
                twlog_warn!("Not releasing issue #{}: lock file is unreadable", issue);
            }
            None => {
                twlog_debug!("release_task: issue #{} was not locked", issue);
            }
        }
        Ok(())
    }

    /// Delete every abandoned task lock. Returns the affected issue numbers.
    pub fn reclaim_stale_locks(&self) -> Result<Vec<u64>> {
        let now = Utc::now();
        let mut removed = Vec::new();

        for (issue, path) in self.lock_files(TASK_LOCK_PREFIX)? {
            let abandoned = matches!(
                self.inspect(issue, now)?,
                Occupant::Stale(_) | Occupant::UnreadableStale
            );
            if abandoned && remove_if_exists(&path)? {
                twlog_warn!("Removed stale lock for issue #{}", issue);
                removed.push(issue);
            }
        }
        Ok(removed)
    }
}
