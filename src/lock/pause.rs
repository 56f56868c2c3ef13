//! Global pause switch. The file's existence is the signal; its body is advisory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::LockCoordinator;
use crate::schema::SchemaName;
use crate::state::{load_document, remove_if_exists, save_document};
use crate::{twlog, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseLock {
    pub paused_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the operator intends work to resume. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PauseLock {
    pub fn resume_due(&self, now: DateTime<Utc>) -> bool {
        self.resume_at.is_some_and(|at| at <= now)
    }
}

impl LockCoordinator {
    /// Existence check only; the file is not parsed.
    pub fn is_paused(&self) -> bool {
        self.pause_lock_path().exists()
    }

    /// Pause all workers. Pausing while paused replaces the previous record.
    pub fn pause(&self, reason: Option<String>, resume_at: Option<DateTime<Utc>>) -> Result<PauseLock> {
        let lock = PauseLock {
            paused_at: Utc::now(),
            reason,
            resume_at,
            extra: Map::new(),
        };
        save_document(&self.pause_lock_path(), SchemaName::PauseLock, &lock)?;
        twlog!(
            "Workers paused{}",
            lock.reason
                .as_deref()
                .map(|r| format!(": {}", r))
                .unwrap_or_default()
        );
        Ok(lock)
    }

    /// Resume all workers. Returns `false` if they were not paused.
    pub fn resume(&self) -> Result<bool> {
        let removed = remove_if_exists(&self.pause_lock_path())?;
        if removed {
            twlog!("Workers resumed");
        }
        Ok(removed)
    }

    pub fn load_pause_lock(&self) -> Option<PauseLock> {
        load_document(
            &self.pause_lock_path(),
            SchemaName::PauseLock,
            self.diagnostics(),
        )
    }
}
