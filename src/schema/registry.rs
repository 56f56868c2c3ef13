//! Schemas for every persisted entity kind.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::descriptor::{FieldSpec, Schema};
use crate::Error;

/// Maximum cost of a single record, in currency units.
pub const MAX_COST: f64 = 1000.0;
/// One week.
pub const MAX_DURATION_SECS: f64 = 7.0 * 24.0 * 3600.0;
pub const MAX_TASK_COUNT: f64 = 10_000.0;
pub const MAX_ITERATIONS: f64 = 100.0;

pub static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})$").unwrap()
});

fn timestamp(name: &'static str) -> FieldSpec {
    FieldSpec::string(name).pattern(&TIMESTAMP_RE)
}

fn cost(name: &'static str) -> FieldSpec {
    FieldSpec::number(name)
        .required()
        .min(0.0)
        .max(MAX_COST)
        .default(0)
}

fn duration(name: &'static str) -> FieldSpec {
    FieldSpec::number(name)
        .required()
        .min(0.0)
        .max(MAX_DURATION_SECS)
        .default(0)
}

fn task_count(name: &'static str) -> FieldSpec {
    FieldSpec::integer(name)
        .required()
        .min(0.0)
        .max(MAX_TASK_COUNT)
        .default(0)
}

fn iterations(name: &'static str) -> FieldSpec {
    FieldSpec::integer(name)
        .required()
        .min(0.0)
        .max(MAX_ITERATIONS)
        .default(0)
}

fn issue_number() -> FieldSpec {
    FieldSpec::integer("issue_number").required().min(1.0)
}

static SESSION_STATS: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "session-stats",
        vec![
            FieldSpec::string("session_id").required().min(1.0),
            timestamp("started_at").required(),
            timestamp("ended_at"),
            duration("duration_secs"),
            cost("total_cost"),
            task_count("tasks_completed"),
            task_count("tasks_failed"),
            FieldSpec::string("repo_name"),
        ],
    )
});

static TASK_METRICS: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "task-metrics",
        vec![
            issue_number(),
            FieldSpec::one_of("status", &["success", "failed", "skipped", "timeout"]).required(),
            timestamp("started_at").required(),
            timestamp("completed_at"),
            duration("duration_secs"),
            cost("cost"),
            iterations("iterations"),
            FieldSpec::string("session_id"),
            FieldSpec::string("error"),
        ],
    )
});

static PROGRESS: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "progress",
        vec![
            FieldSpec::string("session_id").required().min(1.0),
            FieldSpec::one_of(
                "status",
                &["idle", "running", "paused", "completed", "failed"],
            )
            .required()
            .default("idle"),
            FieldSpec::integer("current_issue").min(1.0),
            iterations("iteration"),
            task_count("tasks_total"),
            task_count("tasks_completed"),
            task_count("tasks_failed"),
            cost("total_cost"),
            timestamp("updated_at").required(),
        ],
    )
});

static PAUSE_LOCK: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "pause-lock",
        vec![
            timestamp("paused_at").required(),
            FieldSpec::string("reason"),
            timestamp("resume_at"),
        ],
    )
});

static APPROVAL_LOCK: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "approval-lock",
        vec![
            FieldSpec::one_of("status", &["pending", "approved", "rejected"]).required(),
            timestamp("created_at").required(),
            issue_number(),
            FieldSpec::string("issue_title"),
            FieldSpec::string("branch"),
            FieldSpec::string("phase").required().min(1.0),
            FieldSpec::integer("files_changed").min(0.0).default(0),
            FieldSpec::integer("insertions").min(0.0).default(0),
            FieldSpec::integer("deletions").min(0.0).default(0),
            timestamp("decided_at"),
        ],
    )
});

static TASK_LOCK: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "task-lock",
        vec![
            issue_number(),
            FieldSpec::string("session_id").required().min(1.0),
            FieldSpec::integer("pid").required().min(1.0),
            FieldSpec::string("hostname").required().min(1.0),
            timestamp("locked_at").required(),
            timestamp("last_heartbeat").required(),
            FieldSpec::string("worker_id"),
            FieldSpec::string("repo_name"),
        ],
    )
});

/// Every persisted entity kind with a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaName {
    SessionStats,
    TaskMetrics,
    Progress,
    PauseLock,
    ApprovalLock,
    TaskLock,
}

impl SchemaName {
    pub const ALL: [SchemaName; 6] = [
        SchemaName::SessionStats,
        SchemaName::TaskMetrics,
        SchemaName::Progress,
        SchemaName::PauseLock,
        SchemaName::ApprovalLock,
        SchemaName::TaskLock,
    ];

    pub fn schema(&self) -> &'static Schema {
        match self {
            SchemaName::SessionStats => &SESSION_STATS,
            SchemaName::TaskMetrics => &TASK_METRICS,
            SchemaName::Progress => &PROGRESS,
            SchemaName::PauseLock => &PAUSE_LOCK,
            SchemaName::ApprovalLock => &APPROVAL_LOCK,
            SchemaName::TaskLock => &TASK_LOCK,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.schema().name()
    }

    /// Whether files of this kind hold an array of records.
    pub fn is_array(&self) -> bool {
        matches!(self, SchemaName::SessionStats | SchemaName::TaskMetrics)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        SchemaName::ALL
            .into_iter()
            .find(|name| name.as_str() == normalized)
            .ok_or_else(|| Error::UnknownSchema(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_constants() {
        assert_eq!(MAX_COST, 1000.0);
        assert_eq!(MAX_DURATION_SECS, 604_800.0);
        assert_eq!(MAX_TASK_COUNT, 10_000.0);
        assert_eq!(MAX_ITERATIONS, 100.0);
    }

    #[test]
    fn test_schema_names_round_trip_through_from_str() {
        for name in SchemaName::ALL {
            assert_eq!(name.as_str().parse::<SchemaName>().unwrap(), name);
        }
        assert_eq!(
            "TASK_LOCK".parse::<SchemaName>().unwrap(),
            SchemaName::TaskLock
        );
        assert!(matches!(
            "nope".parse::<SchemaName>(),
            Err(Error::UnknownSchema(_))
        ));
    }

    #[test]
    fn test_timestamp_pattern() {
        assert!(TIMESTAMP_RE.is_match("2024-05-01T10:00:00Z"));
        assert!(TIMESTAMP_RE.is_match("2024-05-01T10:00:00.123Z"));
        assert!(TIMESTAMP_RE.is_match("2024-05-01T10:00:00+02:00"));
        assert!(!TIMESTAMP_RE.is_match("2024-05-01 10:00:00"));
        assert!(!TIMESTAMP_RE.is_match("yesterday"));
    }

    #[test]
    fn test_array_kinds() {
        assert!(SchemaName::SessionStats.is_array());
        assert!(SchemaName::TaskMetrics.is_array());
        assert!(!SchemaName::TaskLock.is_array());
    }

    #[test]
    fn test_task_lock_requires_positive_pid() {
        let spec = SchemaName::TaskLock.schema().field("pid").unwrap();
        assert!(spec.required);
        assert!(spec.default.is_none());
    }
}
