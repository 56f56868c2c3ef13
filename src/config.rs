use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::lock::{DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_STALE_AFTER_SECS};
use crate::retry::RetryPolicy;
use crate::{twlog_debug, Error, Result};

/// Lock timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub stale_after_secs: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
        }
    }
}

impl LockSettings {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Shared state directory. Defaults to `~/.taskward/state`.
    pub state_dir: Option<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub locks: LockSettings,
}

impl Config {
    pub fn base_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".taskward"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("taskward.toml"))
    }

    /// Resolve the state directory, expanding a leading `~/`.
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::base_dir()?.join("state")),
        }
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        twlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            twlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config = Self::parse(&fs::read_to_string(&path)?)?;
        twlog_debug!(
            "Config loaded: state_dir={:?}, retry={:?}, locks={:?}",
            config.state_dir,
            config.retry,
            config.locks
        );
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn save(&self) -> Result<()> {
        let base_dir = Self::base_dir()?;
        twlog_debug!("Config::save base_dir={}", base_dir.display());
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        twlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<PathBuf> {
        let state_dir = self.state_dir()?;
        if !state_dir.exists() {
            twlog_debug!("Creating state directory: {}", state_dir.display());
            fs::create_dir_all(&state_dir)?;
        }
        Ok(state_dir)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
