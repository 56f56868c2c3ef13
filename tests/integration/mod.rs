//! Integration test suite for taskward.
//!
//! These tests drive the public API the way a worker process does: several
//! coordinators share one state directory, remote calls are simulated with
//! closures that fail on a schedule, and state files are damaged on disk
//! before being read back.
//!
//! # Test Categories
//!
//! - `retry_flow`: Classification and backoff around simulated remote calls
//! - `lock_coordination`: Task claims, stale reclaim, pause and approvals
//! - `state_recovery`: Repair of damaged state files on load

mod fixtures;

mod lock_coordination;
mod retry_flow;
mod state_recovery;
