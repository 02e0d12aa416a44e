//! All-or-none removal of a store and its WAL sidecar files
//!
//! Files are first renamed to staging names. If any rename fails (another
//! process still holds the file open on platforms that forbid it), every
//! rename done so far is rolled back and the attempt is retried after a
//! backoff. Only when all files are staged are they removed.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

/// Suffixes of the files SQLite keeps next to the main database in WAL mode
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Retry schedule for cleanup
#[derive(Debug, Clone, Copy)]
pub struct CleanupPolicy {
    pub max_attempts: u32,
    /// Backoff before attempt `n` is `base_backoff * n`
    pub base_backoff: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(200),
        }
    }
}

/// Outcome of a cleanup; failure is reported here rather than raised
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub attempts: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The main database path plus its sidecar paths, existing or not
pub fn store_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in SIDECAR_SUFFIXES {
        let mut name: OsString = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(format!(".deleting-{}", std::process::id()));
    PathBuf::from(name)
}

/// Stage every existing file or none of them
fn stage_all(files: &[PathBuf]) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
    for file in files.iter().filter(|f| f.exists()) {
        let target = staging_path(file);
        if let Err(e) = fs::rename(file, &target) {
            for (original, moved) in staged.iter().rev() {
                if let Err(rollback) = fs::rename(moved, original) {
                    warn!(file = %original.display(), error = %rollback, "failed to roll back staged file");
                }
            }
            return Err(e);
        }
        staged.push((file.clone(), target));
    }
    Ok(staged)
}

/// Remove the store at `path` together with its `-wal` and `-shm` files
///
/// A store that does not exist is a successful, empty cleanup.
pub fn cleanup_store(path: &Path, policy: CleanupPolicy) -> CleanupReport {
    let files = store_files(path);
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            thread::sleep(policy.base_backoff * (attempt - 1));
        }

        let staged = match stage_all(&files) {
            Ok(staged) => staged,
            Err(e) => {
                debug!(attempt, error = %e, "store files busy, will retry");
                last_error = Some(e.to_string());
                continue;
            }
        };

        let mut removed = Vec::with_capacity(staged.len());
        for (original, moved) in staged {
            match fs::remove_file(&moved) {
                Ok(()) => removed.push(original),
                Err(e) if e.kind() == io::ErrorKind::NotFound => removed.push(original),
                Err(e) => {
                    // Staged but undeletable; the original name is already free
                    warn!(file = %moved.display(), error = %e, "could not remove staged file");
                    removed.push(original);
                }
            }
        }

        info!(path = %path.display(), files = removed.len(), attempt, "store cleaned up");
        return CleanupReport {
            removed,
            attempts: attempt,
            success: true,
            error: None,
        };
    }

    warn!(path = %path.display(), attempts = max_attempts, "store cleanup failed");
    CleanupReport {
        removed: Vec::new(),
        attempts: max_attempts,
        success: false,
        error: last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast() -> CleanupPolicy {
        CleanupPolicy {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_store_files_lists_sidecars() {
        let files = store_files(Path::new("/tmp/run.db"));
        assert_eq!(
            files,
            vec![
                PathBuf::from("/tmp/run.db"),
                PathBuf::from("/tmp/run.db-wal"),
                PathBuf::from("/tmp/run.db-shm"),
            ]
        );
    }

    #[test]
    fn test_removes_main_and_sidecars() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.db");
        for file in store_files(&path) {
            fs::write(&file, b"x").unwrap();
        }

        let report = cleanup_store(&path, fast());
        assert!(report.success);
        assert_eq!(report.removed.len(), 3);
        assert_eq!(report.attempts, 1);
        for file in store_files(&path) {
            assert!(!file.exists());
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_store_is_success() {
        let dir = TempDir::new().unwrap();
        let report = cleanup_store(&dir.path().join("absent.db"), fast());
        assert!(report.success);
        assert!(report.removed.is_empty());
    }

    #[test]
    fn test_only_main_file_present() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.db");
        fs::write(&path, b"x").unwrap();

        let report = cleanup_store(&path, fast());
        assert!(report.success);
        assert_eq!(report.removed, vec![path.clone()]);
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_stage_rolls_back_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.db");
        let files = store_files(&path);
        fs::write(&files[0], b"main").unwrap();
        fs::write(&files[1], b"wal").unwrap();

        // The main file stages first; the WAL cannot move onto a directory
        let blocker = staging_path(&files[1]);
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        let report = cleanup_store(&path, fast());
        assert!(!report.success);
        assert_eq!(report.attempts, 2);
        assert!(report.error.is_some());
        assert!(report.removed.is_empty());
        assert_eq!(fs::read(&files[0]).unwrap(), b"main");
        assert_eq!(fs::read(&files[1]).unwrap(), b"wal");
        assert!(!staging_path(&files[0]).exists());

        fs::remove_dir_all(&blocker).unwrap();
        let report = cleanup_store(&path, fast());
        assert!(report.success);
        assert_eq!(report.removed, files[..2].to_vec());
        assert!(!files[0].exists() && !files[1].exists());
    }
}
