//! Crash-safe JSON file primitives.
//!
//! Readers in other processes may open a state file at any moment, so writers
//! never edit in place: content goes to a private temp file in the same
//! directory and is then published with a single rename or link.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{twlog_debug, Result};

/// Temp path next to `path`, unique per writer.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let unique = Uuid::new_v4().simple().to_string();
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), &unique[..8]))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            twlog_debug!("Creating state directory: {}", parent.display());
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_temp<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf> {
    ensure_parent(path)?;
    let contents = serde_json::to_string_pretty(value)?;
    let temp = temp_path(path);
    fs::write(&temp, contents)?;
    Ok(temp)
}

/// Serialize `value` and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let temp = write_temp(path, value)?;
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    twlog_debug!("State written: {}", path.display());
    Ok(())
}

/// Publish `value` at `path` only if nothing is there yet.
///
/// The file becomes visible complete, never partially written. Returns
/// `false` when another writer got there first.
pub fn create_json_exclusive<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<bool> {
    let temp = write_temp(path, value)?;
    let outcome = fs::hard_link(&temp, path);
    let _ = fs::remove_file(&temp);

    match outcome {
        Ok(()) => {
            twlog_debug!("State created: {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            twlog_debug!("State already exists: {}", path.display());
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Copy `path` to `<path>.bak` if it exists.
pub fn backup(path: &Path) -> Result<()> {
    if path.exists() {
        let mut backup_name = path.as_os_str().to_owned();
        backup_name.push(".bak");
        let backup_path = PathBuf::from(backup_name);
        twlog_debug!("Creating state backup: {}", backup_path.display());
        fs::copy(path, &backup_path)?;
    }
    Ok(())
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub fn read_json(path: &Path) -> Result<Option<Value>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete `path`. Returns `false` if it was already gone.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("progress.json");
        write_json_atomic(&path, &json!({"a": 1})).unwrap();
        assert_eq!(read_json(&path).unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &json!([1])).unwrap();
        write_json_atomic(&path, &json!([1, 2])).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["state.json".to_string()]);
    }

    #[test]
    fn test_create_exclusive_only_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("task-1.lock");
        assert!(create_json_exclusive(&path, &json!({"pid": 1})).unwrap());
        assert!(!create_json_exclusive(&path, &json!({"pid": 2})).unwrap());
        assert_eq!(read_json(&path).unwrap(), Some(json!({"pid": 1})));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(read_json(&path).unwrap(), None);

        fs::write(&path, "{\"truncated\": ").unwrap();
        assert!(matches!(read_json(&path), Err(crate::Error::Json(_))));
    }

    #[test]
    fn test_backup_and_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session-stats.json");
        backup(&path).unwrap();
        assert!(!dir.path().join("session-stats.json.bak").exists());

        fs::write(&path, "[]").unwrap();
        backup(&path).unwrap();
        assert!(dir.path().join("session-stats.json.bak").exists());

        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }
}
