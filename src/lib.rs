pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lock;
pub mod log;
pub mod remote;
pub mod retry;
pub mod schema;
pub mod state;
pub mod util;

pub use config::Config;
pub use diagnostics::{Diagnostic, DiagnosticsSink, LogSink, MemorySink, NullSink};
pub use error::{Error, Result};
pub use lock::{LockCoordinator, WorkerInfo};
pub use retry::{classify, execute_with_retry, is_recoverable, safe_execute_with_retry, RetryPolicy};
pub use schema::{validate, validate_array, SchemaName, ValidateOptions, ValidationResult};
pub use state::StateStore;
