//! Human approval gates, one lock file per issue.
//!
//! `pending` moves to `approved` or `rejected` exactly once. A decided lock
//! stays terminal until a new request starts a fresh cycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{LockCoordinator, APPROVAL_LOCK_PREFIX};
use crate::schema::SchemaName;
use crate::state::{load_document, remove_if_exists, save_document};
use crate::{twlog, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalLock {
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub issue_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insertions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApprovalLock {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

/// What a worker asks a human to approve.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub issue_number: u64,
    pub phase: String,
    pub issue_title: Option<String>,
    pub branch: Option<String>,
    pub files_changed: Option<u32>,
    pub insertions: Option<u32>,
    pub deletions: Option<u32>,
}

impl ApprovalRequest {
    pub fn new(issue_number: u64, phase: impl Into<String>) -> Self {
        Self {
            issue_number,
            phase: phase.into(),
            issue_title: None,
            branch: None,
            files_changed: None,
            insertions: None,
            deletions: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.issue_title = Some(title.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_diff_stats(mut self, files_changed: u32, insertions: u32, deletions: u32) -> Self {
        self.files_changed = Some(files_changed);
        self.insertions = Some(insertions);
        self.deletions = Some(deletions);
        self
    }
}

impl LockCoordinator {
    /// Start a new approval cycle for an issue, replacing any previous lock.
    pub fn request_approval(&self, request: ApprovalRequest) -> Result<ApprovalLock> {
        let lock = ApprovalLock {
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            issue_number: request.issue_number,
            issue_title: request.issue_title,
            branch: request.branch,
            phase: request.phase,
            files_changed: request.files_changed,
            insertions: request.insertions,
            deletions: request.deletions,
            decided_at: None,
            extra: Map::new(),
        };
        save_document(
            &self.approval_lock_path(lock.issue_number),
            SchemaName::ApprovalLock,
            &lock,
        )?;
        twlog!(
            "Approval requested for issue #{} (phase {})",
            lock.issue_number,
            lock.phase
        );
        Ok(lock)
    }

    pub fn approve(&self, issue: u64) -> Result<ApprovalLock> {
        self.decide(issue, ApprovalStatus::Approved)
    }

    pub fn reject(&self, issue: u64) -> Result<ApprovalLock> {
        self.decide(issue, ApprovalStatus::Rejected)
    }

    fn decide(&self, issue: u64, status: ApprovalStatus) -> Result<ApprovalLock> {
        let Some(mut lock) = self.load_approval_lock(issue) else {
            return Err(Error::InvalidApprovalTransition {
                issue,
                from: "absent".to_string(),
                to: status.to_string(),
            });
        };
        if !lock.is_pending() {
            return Err(Error::InvalidApprovalTransition {
                issue,
                from: lock.status.to_string(),
                to: status.to_string(),
            });
        }

        lock.status = status;
        lock.decided_at = Some(Utc::now());
        save_document(
            &self.approval_lock_path(issue),
            SchemaName::ApprovalLock,
            &lock,
        )?;
        twlog!("Issue #{} {}", issue, status);
        Ok(lock)
    }

    pub fn load_approval_lock(&self, issue: u64) -> Option<ApprovalLock> {
        load_document(
            &self.approval_lock_path(issue),
            SchemaName::ApprovalLock,
            self.diagnostics(),
        )
    }

    /// Every readable approval lock, ordered by issue number.
    ///
    /// Files are parsed independently; a corrupt one is skipped.
    pub fn list_approval_locks(&self) -> Vec<ApprovalLock> {
        self.lock_files_or_empty(APPROVAL_LOCK_PREFIX)
            .into_iter()
            .filter_map(|(_, path)| {
                load_document(&path, SchemaName::ApprovalLock, self.diagnostics())
            })
            .collect()
    }

    /// First pending approval by issue number. More than one may exist.
    pub fn find_pending_approval(&self) -> Option<ApprovalLock> {
        self.list_approval_locks()
            .into_iter()
            .find(ApprovalLock::is_pending)
    }

    pub fn remove_approval(&self, issue: u64) -> Result<bool> {
        remove_if_exists(&self.approval_lock_path(issue))
    }
}
