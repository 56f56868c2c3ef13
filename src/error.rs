use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    /// Failure reported by a remote-call tool. Displays the tool's text verbatim.
    #[error("{0}")]
    Remote(String),

    #[error("Lock for issue #{issue} is not held by this worker (holder: {holder})")]
    LockNotHeld { issue: u64, holder: String },

    #[error("Invalid approval transition for issue #{issue} from {from} to {to}")]
    InvalidApprovalTransition {
        issue: u64,
        from: String,
        to: String,
    },

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),
}

pub type Result<T> = std::result::Result<T, Error>;
