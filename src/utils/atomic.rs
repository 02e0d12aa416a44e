//! Atomic file operations
//!
//! The server publishes its lifecycle status to a small JSON file that other
//! processes poll. Readers must never observe a half-written file, so every
//! write goes through a temp file that is synced and then renamed into place.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Temp path unique to this process, next to the destination
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Atomically write content to a file
///
/// 1. Writes content to a per-process `.tmp` sibling
/// 2. Syncs the file to disk
/// 3. Renames it over the final path
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    let temp_path = temp_path_for(path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

/// Atomically write a value as pretty JSON
pub fn atomic_write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    atomic_write(path, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parent_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("status.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_atomic_write_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");

        atomic_write_json(&path, &json!({"state": "running", "pid": 42})).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["state"], "running");
        assert_eq!(value["pid"], 42);
    }
}
