//! On-disk state shared between worker processes.
//!
//! Every file is flat UTF-8 JSON with one schema per role. Writers replace
//! files atomically; readers validate with recovery.

mod atomic;
mod records;
mod store;

pub use atomic::{backup, create_json_exclusive, read_json, remove_if_exists, write_json_atomic};
pub use records::{Progress, ProgressStatus, SessionStats, TaskMetrics, TaskOutcome};
pub use store::{StateStore, PROGRESS_FILE, SESSION_STATS_FILE, TASK_METRICS_FILE};

pub(crate) use store::{create_document, load_document, save_document};
