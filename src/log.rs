//! Operator log shared by every taskward process on a host.
//!
//! Workers and CLI invocations append to the same file, so each line carries
//! the writer's pid and the file is never truncated by a starting process.
//!
//! | Level | Used for |
//! |---|---|
//! | ERROR | exhausted retries, lock I/O failures |
//! | WARN  | stale locks reclaimed, corrupt state files |
//! | INFO  | claims, releases, pauses, approvals |
//! | DEBUG | retry waits, state writes |
//! | TRACE | raw remote output |
//!
//! `--debug` or `TASKWARD_DEBUG=1|true` lowers the threshold to DEBUG.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

static LOG_FILE: RwLock<Option<PathBuf>> = RwLock::new(None);
static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

pub const DEBUG_ENV: &str = "TASKWARD_DEBUG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// `~/.taskward/taskward.log`, if there is a home directory.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".taskward").join("taskward.log"))
}

fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Log to the default file at INFO, or DEBUG when the env var asks for it.
pub fn init() {
    init_with_debug(false);
}

pub fn init_with_debug(debug: bool) {
    if let Some(path) = default_log_path() {
        init_at(path, debug);
    }
}

/// Direct the log to `path`. Existing content is kept.
pub fn init_at(path: impl Into<PathBuf>, debug: bool) {
    let path = path.into();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let threshold = if debug || debug_from_env() {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    set_level(threshold);
    if let Ok(mut slot) = LOG_FILE.write() {
        *slot = Some(path);
    }
}

pub fn set_level(level: LogLevel) {
    THRESHOLD.store(level as u8, Ordering::SeqCst);
}

pub fn level() -> LogLevel {
    let raw = THRESHOLD.load(Ordering::Relaxed) as usize;
    LogLevel::ALL[raw.min(LogLevel::ALL.len() - 1)]
}

pub fn is_debug() -> bool {
    level() >= LogLevel::Debug
}

fn format_line(level: LogLevel, msg: &str) -> String {
    format!(
        "[{}] [{}] [pid {}] {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        level.label(),
        std::process::id(),
        msg
    )
}

fn append_line(path: &Path, line: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", line);
    }
}

/// Write `msg` if `level` passes the threshold. Silent before `init`.
pub fn log_at(level: LogLevel, msg: &str) {
    if level > self::level() {
        return;
    }
    let Ok(slot) = LOG_FILE.read() else {
        return;
    };
    if let Some(path) = slot.as_deref() {
        append_line(path, &format_line(level, msg));
    }
}

#[macro_export]
macro_rules! twlog {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! twlog_error {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! twlog_warn {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

/// Only written in debug mode.
#[macro_export]
macro_rules! twlog_debug {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Debug, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! twlog_trace {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Trace, &format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_levels_order_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);
        for (i, level) in LogLevel::ALL.iter().enumerate() {
            assert_eq!(*level as usize, i);
        }
    }

    #[test]
    fn test_line_carries_level_and_pid() {
        let line = format_line(LogLevel::Warn, "stale lock");
        assert!(line.contains("[WARN]"));
        assert!(line.contains(&format!("[pid {}]", std::process::id())));
        assert!(line.ends_with("stale lock"));
    }

    #[test]
    fn test_reinit_keeps_lines_from_earlier_processes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("taskward.log");

        init_at(&path, false);
        twlog!("worker A claimed issue #{}", 42);
        init_at(&path, false);
        twlog!("status requested");

        let contents = fs::read_to_string(&path).unwrap();
        let a = contents.find("worker A claimed issue #42").unwrap();
        let b = contents.find("status requested").unwrap();
        assert!(a < b);
    }
}
