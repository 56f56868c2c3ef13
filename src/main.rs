use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;

use taskward::diagnostics::LogSink;
use taskward::lock::{ApprovalLock, LockCoordinator, PauseLock, TaskLock, WorkerInfo};
use taskward::remote::GhCli;
use taskward::schema::{validate, validate_array, SchemaName, ValidateOptions};
use taskward::state::StateStore;
use taskward::{twlog, Config, Error, Result};

/// Taskward - coordination and resilience layer for autonomous issue workers
#[derive(Parser, Debug)]
#[command(name = "taskward")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    TASKWARD_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.taskward/taskward.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Shared state directory (overrides the config file)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show pause state, task locks, pending approvals and progress
    Status,

    /// Pause every worker sharing the state directory
    Pause {
        /// Why workers are paused
        #[arg(long)]
        reason: Option<String>,

        /// When work is expected to resume (RFC 3339)
        #[arg(long)]
        resume_at: Option<DateTime<Utc>>,
    },

    /// Remove the pause lock
    Resume,

    /// List approval locks
    Approvals,

    /// Approve a pending approval request
    Approve {
        /// Issue number
        issue: u64,
    },

    /// Reject a pending approval request
    Reject {
        /// Issue number
        issue: u64,
    },

    /// List task locks
    Locks {
        /// Remove locks whose heartbeat is stale
        #[arg(long)]
        reclaim: bool,
    },

    /// Validate a state file against a named schema
    Validate {
        /// JSON file to check
        file: PathBuf,

        /// Schema name (session-stats, task-metrics, progress, pause-lock,
        /// approval-lock, task-lock)
        #[arg(long)]
        schema: SchemaName,

        /// Repair invalid fields with defaults and print the result
        #[arg(long)]
        recover: bool,
    },

    /// Run the gh CLI with retries
    Gh {
        /// Arguments passed to gh
        #[arg(last = true, required = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    taskward::log::init_with_debug(cli.debug);
    twlog!("taskward {:?}", cli.command);

    let config = Config::load()?;
    let state_dir = match &cli.state_dir {
        Some(dir) => dir.clone(),
        None => config.ensure_dirs()?,
    };

    match cli.command {
        Command::Status => run_status(&config, &state_dir),
        Command::Pause { reason, resume_at } => run_pause(&config, &state_dir, reason, resume_at),
        Command::Resume => run_resume(&config, &state_dir),
        Command::Approvals => run_approvals(&config, &state_dir),
        Command::Approve { issue } => run_decide(&config, &state_dir, issue, true),
        Command::Reject { issue } => run_decide(&config, &state_dir, issue, false),
        Command::Locks { reclaim } => run_locks(&config, &state_dir, reclaim),
        Command::Validate {
            file,
            schema,
            recover,
        } => run_validate(&file, schema, recover),
        Command::Gh { args } => run_gh(&config, &args),
    }
}

fn coordinator(config: &Config, state_dir: &Path) -> LockCoordinator {
    let session_id = format!("cli-{}", &uuid::Uuid::new_v4().to_string()[..8]);
    LockCoordinator::new(state_dir, WorkerInfo::current(session_id))
        .with_stale_after(config.locks.stale_after())
        .with_diagnostics(Arc::new(LogSink))
}

fn run_status(config: &Config, state_dir: &Path) -> Result<()> {
    let locks = coordinator(config, state_dir);
    let store = StateStore::new(state_dir, Arc::new(LogSink));

    println!("State directory: {}", state_dir.display());
    match locks.load_pause_lock() {
        Some(pause) => println!("Workers: paused{}", describe_pause(&pause)),
        None if locks.is_paused() => println!("Workers: paused"),
        None => println!("Workers: running"),
    }

    let task_locks = locks.list_task_locks();
    println!("\nTask locks: {}", task_locks.len());
    for lock in &task_locks {
        print_task_lock(&locks, lock);
    }

    match locks.find_pending_approval() {
        Some(approval) => {
            println!("\nPending approval:");
            print_approval(&approval);
        }
        None => println!("\nPending approval: none"),
    }

    if let Some(progress) = store.load_progress() {
        println!("\nProgress ({}):", progress.session_id);
        println!("  Status:    {:?}", progress.status);
        if let Some(issue) = progress.current_issue {
            println!("  Issue:     #{}", issue);
        }
        println!(
            "  Tasks:     {}/{} completed, {} failed",
            progress.tasks_completed, progress.tasks_total, progress.tasks_failed
        );
        println!("  Iteration: {}", progress.iteration);
        println!("  Cost:      ${:.2}", progress.total_cost);
        println!("  Updated:   {}", progress.updated_at.to_rfc3339());
    }

    let sessions = store.load_session_stats();
    let metrics = store.load_task_metrics();
    let total_cost: f64 = sessions.iter().map(|s| s.total_cost).sum();
    println!(
        "\nHistory: {} sessions, {} tasks recorded, ${:.2} total cost",
        sessions.len(),
        metrics.len(),
        total_cost
    );
    Ok(())
}

fn describe_pause(pause: &PauseLock) -> String {
    let mut out = format!(" since {}", pause.paused_at.to_rfc3339());
    if let Some(reason) = &pause.reason {
        out.push_str(&format!(" ({})", reason));
    }
    if let Some(resume_at) = pause.resume_at {
        out.push_str(&format!(", resume at {}", resume_at.to_rfc3339()));
    }
    out
}

fn print_task_lock(locks: &LockCoordinator, lock: &TaskLock) {
    let age = Utc::now()
        .signed_duration_since(lock.last_heartbeat)
        .num_seconds()
        .max(0);
    let state = if locks.is_stale(lock) { "STALE" } else { "live" };
    println!(
        "  #{:<6} {:<5} {} heartbeat {}s ago",
        lock.issue_number,
        state,
        lock.holder(),
        age
    );
}

fn print_approval(approval: &ApprovalLock) {
    let title = approval.issue_title.as_deref().unwrap_or("");
    println!(
        "  #{:<6} {:<8} {:<14} {}",
        approval.issue_number, approval.status, approval.phase, title
    );
    if let Some(branch) = &approval.branch {
        println!("          branch {}", branch);
    }
    if let (Some(files), Some(ins), Some(del)) =
        (approval.files_changed, approval.insertions, approval.deletions)
    {
        println!("          {} files changed, +{} -{}", files, ins, del);
    }
}

fn run_pause(
    config: &Config,
    state_dir: &Path,
    reason: Option<String>,
    resume_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let pause = coordinator(config, state_dir).pause(reason, resume_at)?;
    println!("Workers paused{}", describe_pause(&pause));
    Ok(())
}

fn run_resume(config: &Config, state_dir: &Path) -> Result<()> {
    if coordinator(config, state_dir).resume()? {
        println!("Workers resumed");
    } else {
        println!("Workers were not paused");
    }
    Ok(())
}

fn run_approvals(config: &Config, state_dir: &Path) -> Result<()> {
    let approvals = coordinator(config, state_dir).list_approval_locks();
    if approvals.is_empty() {
        println!("No approval requests");
        return Ok(());
    }
    for approval in &approvals {
        print_approval(approval);
    }
    Ok(())
}

fn run_decide(config: &Config, state_dir: &Path, issue: u64, approve: bool) -> Result<()> {
    let locks = coordinator(config, state_dir);
    let decided = if approve {
        locks.approve(issue)?
    } else {
        locks.reject(issue)?
    };
    println!("Issue #{} {}", decided.issue_number, decided.status);
    Ok(())
}

fn run_locks(config: &Config, state_dir: &Path, reclaim: bool) -> Result<()> {
    let locks = coordinator(config, state_dir);
    if reclaim {
        let removed = locks.reclaim_stale_locks()?;
        if removed.is_empty() {
            println!("No stale locks");
        } else {
            let issues: Vec<String> = removed.iter().map(|i| format!("#{}", i)).collect();
            println!("Removed stale locks: {}", issues.join(", "));
        }
    }

    let task_locks = locks.list_task_locks();
    if task_locks.is_empty() {
        println!("No task locks");
    }
    for lock in &task_locks {
        print_task_lock(&locks, lock);
    }
    Ok(())
}

fn run_validate(file: &Path, schema: SchemaName, recover: bool) -> Result<()> {
    let data: Value = serde_json::from_str(&fs::read_to_string(file)?)?;
    let sink = LogSink;
    let options = ValidateOptions {
        recover,
        file_path: Some(file),
        diagnostics: Some(&sink),
    };
    let result = if schema.is_array() {
        validate_array(&data, schema.schema(), &options)
    } else {
        validate(&data, schema.schema(), &options)
    };

    for error in &result.errors {
        let path = if error.path.is_empty() {
            "<root>"
        } else {
            error.path.as_str()
        };
        let marker = if error.recovered { "recovered" } else { "error" };
        println!("{:<9} {}: {}", marker, path, error.message);
    }

    match result.data {
        Some(data) if result.valid => {
            if recover && result.has_recoveries {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{}: valid {}", file.display(), schema);
            }
            Ok(())
        }
        _ => Err(Error::Validation(format!(
            "{} is not a valid {}",
            file.display(),
            schema
        ))),
    }
}

fn run_gh(config: &Config, args: &[String]) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let output = runtime.block_on(GhCli::new().run_with_retry(args, &config.retry))?;
    print!("{}", output);
    Ok(())
}
