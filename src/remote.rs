//! Adapter for the `gh` command-line tool.
//!
//! Failures surface as [`Error::Remote`] carrying the tool's stderr, so the
//! retry classifier sees the same text an operator would.

use std::path::PathBuf;

use tokio::process::Command;

use crate::retry::{execute_with_retry, RetryNotice, RetryPolicy};
use crate::{twlog_debug, twlog_trace, twlog_warn, Error, Result};

pub struct GhCli {
    program: String,
    cwd: Option<PathBuf>,
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GhCli {
    pub fn new() -> Self {
        Self::with_program("gh")
    }

    /// Use another executable, e.g. a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Run once and return stdout.
    pub async fn run(&self, args: &[String]) -> Result<String> {
        twlog_debug!("GhCli::run {} {}", self.program, args.join(" "));
        let mut command = Command::new(&self.program);
        command.args(args).kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            };
            return Err(Error::Remote(message));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        twlog_trace!("GhCli::run output: {} bytes", stdout.len());
        Ok(stdout)
    }

    /// Run with retries, logging each wait.
    pub async fn run_with_retry(&self, args: &[String], policy: &RetryPolicy) -> Result<String> {
        let observer = |notice: &RetryNotice<'_>| {
            twlog_warn!(
                "{} {} failed ({}), attempt {}/{}, retrying in {:?}: {}",
                self.program,
                args.first().map(String::as_str).unwrap_or(""),
                notice.classified.kind,
                notice.attempt,
                notice.max_attempts,
                notice.delay,
                notice.error
            );
        };
        execute_with_retry(move || self.run(args), policy, &observer).await
    }

    /// Run with retries and parse stdout as JSON.
    pub async fn json_with_retry(
        &self,
        args: &[String],
        policy: &RetryPolicy,
    ) -> Result<serde_json::Value> {
        let stdout = self.run_with_retry(args, policy).await?;
        Ok(serde_json::from_str(&stdout)?)
    }
}
