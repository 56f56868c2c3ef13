//! Several workers coordinating through one lock directory.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;

use taskward::diagnostics::MemorySink;
use taskward::lock::{ApprovalRequest, ApprovalStatus};
use taskward::Error;

use crate::fixtures::SharedDir;

#[test]
fn test_second_worker_cannot_claim_live_lock() {
    let shared = SharedDir::new();
    let a = shared.worker(100);
    let b = shared.worker(200);

    assert!(a.claim_task(42).unwrap());
    assert!(!b.claim_task(42).unwrap());
    assert!(a.claim_task(42).unwrap(), "claims are re-entrant for the holder");

    let lock = b.load_task_lock(42).unwrap();
    assert_eq!(lock.pid, 100);
    assert_eq!(lock.worker_id.as_deref(), Some("worker-100"));
    assert_eq!(lock.repo_name.as_deref(), Some("acme/widgets"));
}

#[test]
fn test_stale_lock_is_reclaimed_by_another_worker() {
    let shared = SharedDir::new();
    let threshold = Duration::from_secs(300);
    let t0 = Utc::now() - chrono::Duration::seconds(301);
    shared.plant_task_lock(42, 100, t0);

    let a = shared.worker(100).with_stale_after(threshold);
    let b = shared.worker(200).with_stale_after(threshold);
    assert!(b.is_stale(&b.load_task_lock(42).unwrap()));

    assert!(b.claim_task(42).unwrap());
    assert_eq!(a.load_task_lock(42).unwrap().pid, 200);

    // The presumed-dead holder wakes up and finds it has lost the lock.
    assert!(matches!(
        a.heartbeat(42),
        Err(Error::LockNotHeld { issue: 42, .. })
    ));
    a.release_task(42).unwrap();
    assert_eq!(b.load_task_lock(42).unwrap().pid, 200);

    b.release_task(42).unwrap();
    assert!(a.load_task_lock(42).is_none());
    assert!(a.claim_task(42).unwrap());
}

#[test]
fn test_heartbeat_keeps_lock_fresh() {
    let shared = SharedDir::new();
    let t0 = Utc::now() - chrono::Duration::seconds(200);
    shared.plant_task_lock(7, 100, t0);

    let a = shared.worker(100).with_stale_after(Duration::from_secs(300));
    a.heartbeat(7).unwrap();

    let lock = a.load_task_lock(7).unwrap();
    assert!(lock.last_heartbeat > t0);
    assert_eq!(lock.locked_at, t0);
    assert!(!a.is_stale(&lock));
}

#[test]
fn test_concurrent_claims_have_one_winner() {
    let shared = SharedDir::new();
    let winners: usize = thread::scope(|scope| {
        let handles: Vec<_> = (1..=8u32)
            .map(|pid| {
                let coordinator = shared.worker(pid * 100);
                scope.spawn(move || coordinator.claim_task(9).unwrap())
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|claimed| *claimed)
            .count()
    });
    assert_eq!(winners, 1);

    let files: Vec<_> = fs::read_dir(shared.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(files, vec!["task-9.lock".to_string()]);
}

#[test]
fn test_reclaim_removes_only_stale_locks() {
    let shared = SharedDir::new();
    let old = Utc::now() - chrono::Duration::minutes(30);
    shared.plant_task_lock(1, 100, old);
    shared.plant_task_lock(2, 200, Utc::now());
    shared.plant_task_lock(3, 300, old);

    let operator = shared.worker(999);
    assert_eq!(operator.reclaim_stale_locks().unwrap(), vec![1, 3]);

    let remaining: Vec<u64> = operator
        .list_task_locks()
        .iter()
        .map(|l| l.issue_number)
        .collect();
    assert_eq!(remaining, vec![2]);
}

#[test]
fn test_pause_is_seen_by_every_worker() {
    let shared = SharedDir::new();
    let operator = shared.worker(1);
    let worker = shared.worker(2);

    assert!(!worker.is_paused());
    operator
        .pause(Some("rate limit budget exhausted".to_string()), None)
        .unwrap();
    assert!(worker.is_paused());
    assert_eq!(
        worker.load_pause_lock().unwrap().reason.as_deref(),
        Some("rate limit budget exhausted")
    );

    assert!(operator.resume().unwrap());
    assert!(!worker.is_paused());
}

#[test]
fn test_approval_round_trip_between_worker_and_operator() {
    let shared = SharedDir::new();
    let worker = shared.worker(100);
    let operator = shared.worker(1);

    assert!(operator.find_pending_approval().is_none());
    worker
        .request_approval(
            ApprovalRequest::new(42, "pre-merge")
                .with_title("Add retries to sync")
                .with_diff_stats(4, 120, 30),
        )
        .unwrap();

    let pending = operator.find_pending_approval().unwrap();
    assert_eq!(pending.issue_number, 42);
    assert_eq!(pending.status, ApprovalStatus::Pending);

    operator.approve(42).unwrap();
    assert!(operator.find_pending_approval().is_none());
    assert_eq!(
        worker.load_approval_lock(42).unwrap().status,
        ApprovalStatus::Approved
    );
    assert!(matches!(
        operator.reject(42),
        Err(Error::InvalidApprovalTransition { .. })
    ));
}

#[test]
fn test_corrupt_lock_files_are_reported_not_fatal() {
    let shared = SharedDir::new();
    let sink = Arc::new(MemorySink::new());
    let operator = shared.worker(1).with_diagnostics(sink.clone());

    fs::write(shared.path().join("approval-5.lock"), "{\"status\": ").unwrap();
    fs::write(shared.path().join("task-5.lock"), "[]").unwrap();

    assert!(operator.find_pending_approval().is_none());
    assert!(operator.list_task_locks().is_empty());
    assert!(sink.len() >= 2);

    // A fresh unreadable lock still blocks claims until it goes stale.
    assert!(!operator.claim_task(5).unwrap());
}
