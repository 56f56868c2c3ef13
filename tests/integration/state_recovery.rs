//! Damaged state files are repaired on load, never on write.

use std::fs;

use chrono::Utc;
use serde_json::json;

use taskward::diagnostics::MemorySink;
use taskward::schema::{validate, validate_as, SchemaName, ValidateOptions};
use taskward::state::{Progress, ProgressStatus, SessionStats, TaskMetrics, TaskOutcome};
use taskward::Error;

use crate::fixtures::SharedDir;

#[test]
fn test_negative_duration_recovered_to_zero() {
    let data = json!({
        "session_id": "s-1",
        "started_at": "2024-05-01T10:00:00Z",
        "duration_secs": -100,
        "total_cost": 1.25,
        "tasks_completed": 2,
        "tasks_failed": 0
    });

    let result = validate(
        &data,
        SchemaName::SessionStats.schema(),
        &ValidateOptions::recovering(),
    );

    assert!(result.valid);
    assert!(result.has_recoveries);
    assert_eq!(result.data.as_ref().unwrap()["duration_secs"], json!(0));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "duration_secs");
    assert!(result.errors[0].recovered);
}

#[test]
fn test_strict_validation_rejects_what_recovery_repairs() {
    let data = json!({"session_id": "s-1", "started_at": "2024-05-01T10:00:00Z", "duration_secs": -100});

    let result = validate(
        &data,
        SchemaName::SessionStats.schema(),
        &ValidateOptions::strict(),
    );
    assert!(!result.valid);
    assert!(result.data.is_none());
    assert!(result
        .errors
        .iter()
        .any(|e| e.path == "duration_secs" && e.message.contains("below minimum 0")));
}

#[test]
fn test_recovered_document_decodes_to_record() {
    let sink = MemorySink::new();
    let data = json!({
        "session_id": "s-2",
        "status": "exploding",
        "iteration": 3,
        "tasks_total": 5,
        "tasks_completed": 2,
        "tasks_failed": 1,
        "total_cost": 4.5,
        "updated_at": "2024-05-01T10:05:00Z"
    });

    let options = ValidateOptions::recovering().with_diagnostics(&sink);
    let progress = validate_as::<Progress>(&data, SchemaName::Progress, &options)
        .data
        .unwrap();

    assert_eq!(progress.status, ProgressStatus::Idle);
    assert_eq!(progress.tasks_total, 5);
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "status");
    assert!(entries[0].recovered);
}

#[test]
fn test_store_drops_unrecoverable_metrics_and_keeps_the_rest() {
    let shared = SharedDir::new();
    let (store, sink) = shared.store();
    fs::write(
        store.task_metrics_path(),
        r#"[
          {"issue_number": 1, "status": "success", "started_at": "2024-05-01T10:00:00Z",
           "duration_secs": -5, "cost": 0.4, "iterations": 2},
          {"issue_number": 2, "status": "success"},
          {"issue_number": 3, "status": "timeout", "started_at": "2024-05-01T11:00:00Z",
           "duration_secs": 90, "cost": 5000, "iterations": 4}
        ]"#,
    )
    .unwrap();

    let metrics = store.load_task_metrics();
    let issues: Vec<u64> = metrics.iter().map(|m| m.issue_number).collect();
    assert_eq!(issues, vec![1, 3]);
    assert_eq!(metrics[0].duration_secs, 0.0);
    assert_eq!(metrics[1].cost, 0.0);
    assert_eq!(metrics[1].status, TaskOutcome::Timeout);
    assert!(sink
        .entries()
        .iter()
        .any(|d| d.path.starts_with("[1]") && !d.recovered));
}

#[test]
fn test_store_refuses_to_write_invalid_records() {
    let shared = SharedDir::new();
    let (store, _sink) = shared.store();

    let mut stats = SessionStats::new("s-3", Utc::now());
    stats.total_cost = -1.0;
    let err = store.append_session_stats(stats).unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m.contains("total_cost")));
    assert!(!store.session_stats_path().exists());
}

#[test]
fn test_append_keeps_history_and_unknown_fields() {
    let shared = SharedDir::new();
    let (store, _sink) = shared.store();
    fs::write(
        store.task_metrics_path(),
        r#"[{"issue_number": 8, "status": "failed", "started_at": "2024-05-01T10:00:00Z",
             "duration_secs": 12, "cost": 0.1, "iterations": 1, "model": "large"}]"#,
    )
    .unwrap();

    store
        .append_task_metrics(TaskMetrics {
            issue_number: 9,
            status: TaskOutcome::Success,
            started_at: Utc::now(),
            duration_secs: 30.0,
            cost: 0.2,
            iterations: 2,
            ..TaskMetrics::default()
        })
        .unwrap();

    let metrics = store.load_task_metrics();
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].extra["model"], json!("large"));
    assert_eq!(metrics[1].issue_number, 9);
}

#[test]
fn test_corrupt_progress_reads_as_absent() {
    let shared = SharedDir::new();
    let (store, sink) = shared.store();
    fs::write(store.progress_path(), "{\"session_id\": \"s-4\", ").unwrap();

    assert!(store.load_progress().is_none());
    assert_eq!(sink.len(), 1);
    assert!(sink.entries()[0].message.starts_with("Unreadable state file"));

    let mut progress = Progress::new("s-4");
    progress.status = ProgressStatus::Running;
    progress.current_issue = Some(11);
    store.save_progress(&progress).unwrap();
    assert_eq!(store.load_progress(), Some(progress));

    store.clear_progress().unwrap();
    assert!(store.load_progress().is_none());
}
