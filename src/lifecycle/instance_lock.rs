//! Named OS lock guaranteeing a single server per instance name
//!
//! Backed by an advisory file lock on `<runtime_dir>/<instance>.lock`. The
//! server holds it exclusively; probes take it shared, so two probes never
//! see each other as a server. The OS drops the lock when the holder exits,
//! so a crashed server never leaves a stale lock behind.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::LifecycleError;

/// Held lock; released on drop
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// `Ok(false)` when the lock is taken elsewhere
fn try_lock(file: &File, shared: bool) -> io::Result<bool> {
    let attempt = if shared {
        file.try_lock_shared()
    } else {
        file.try_lock()
    };
    match attempt {
        Ok(()) => Ok(true),
        Err(TryLockError::WouldBlock) => Ok(false),
        Err(TryLockError::Error(err)) => Err(err),
    }
}

impl InstanceLock {
    /// Take the lock, or `None` when another process holds it
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>, LifecycleError> {
        let path = path.as_ref();
        let mut file = open_lock_file(path).map_err(LifecycleError::Lock)?;
        if !try_lock(&file, false).map_err(lock_error)? {
            debug!(path = %path.display(), "instance lock held elsewhere");
            return Ok(None);
        }

        // Informational only; the lock is what matters
        file.set_len(0).map_err(LifecycleError::Lock)?;
        writeln!(file, "{}", std::process::id()).map_err(LifecycleError::Lock)?;

        Ok(Some(Self {
            path: path.to_path_buf(),
            _file: file,
        }))
    }

    /// Retry `try_acquire` until `timeout` passes
    ///
    /// Client probes hold a shared lock for an instant, so a single failed
    /// attempt does not prove another server owns it.
    pub fn acquire_within(
        path: impl AsRef<Path>,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Option<Self>, LifecycleError> {
        let path = path.as_ref();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(Some(lock));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(poll);
        }
    }

    /// Whether some process currently holds the lock at `path`
    pub fn is_held(path: impl AsRef<Path>) -> Result<bool, LifecycleError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(false);
        }
        let file = open_lock_file(path).map_err(LifecycleError::Lock)?;
        // A successful probe lock is released when `file` closes
        Ok(!try_lock(&file, true).map_err(lock_error)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_error(err: io::Error) -> LifecycleError {
    if err.kind() == io::ErrorKind::Unsupported {
        LifecycleError::Unsupported("instance lock")
    } else {
        LifecycleError::Lock(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.lock");

        let lock = InstanceLock::try_acquire(&path).unwrap().unwrap();
        assert!(InstanceLock::try_acquire(&path).unwrap().is_none());
        assert!(InstanceLock::is_held(&path).unwrap());

        drop(lock);
        assert!(!InstanceLock::is_held(&path).unwrap());
        assert!(InstanceLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_missing_lock_file_is_not_held() {
        let dir = TempDir::new().unwrap();
        assert!(!InstanceLock::is_held(dir.path().join("absent.lock")).unwrap());
    }

    #[test]
    fn test_probe_does_not_steal_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.lock");
        assert!(!InstanceLock::is_held(&path).unwrap_or(false));

        let _lock = InstanceLock::try_acquire(&path).unwrap().unwrap();
        for _ in 0..3 {
            assert!(InstanceLock::is_held(&path).unwrap());
        }
    }

    #[test]
    fn test_concurrent_probes_do_not_see_each_other() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.lock");
        let probe = open_lock_file(&path).unwrap();
        assert!(try_lock(&probe, true).unwrap());

        assert!(!InstanceLock::is_held(&path).unwrap());
        assert!(InstanceLock::try_acquire(&path).unwrap().is_none());
        drop(probe);
        assert!(InstanceLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_acquire_within_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sim.lock");
        let lock = InstanceLock::try_acquire(&path).unwrap().unwrap();

        let short = InstanceLock::acquire_within(&path, Duration::from_millis(30), Duration::from_millis(5));
        assert!(short.unwrap().is_none());

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(lock);
        });
        let acquired =
            InstanceLock::acquire_within(&path, Duration::from_secs(2), Duration::from_millis(5)).unwrap();
        assert!(acquired.is_some());
        releaser.join().unwrap();
    }
}
