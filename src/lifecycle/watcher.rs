//! Debounced watcher for store removal and replacement
//!
//! Polls the store file's identity on a background thread. A change is
//! reported once the new identity has been stable for the debounce window,
//! so a delete-then-recreate burst produces a single event.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Removed,
    /// A file now exists that differs from the last one seen
    Replaced,
}

/// What distinguishes one store file from a recreated one at the same path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
pub fn file_identity(path: &Path) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(path).ok()?;
    Some(FileIdentity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
pub fn file_identity(path: &Path) -> Option<FileIdentity> {
    let meta = std::fs::metadata(path).ok()?;
    let created = meta
        .created()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos() as u64);
    Some(FileIdentity {
        dev: 0,
        ino: created,
    })
}

pub struct StoreWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWatcher {
    /// Start watching `path`; events are sent on `tx`
    pub fn spawn(
        path: impl Into<PathBuf>,
        debounce: Duration,
        poll: Duration,
        tx: Sender<WatchEvent>,
    ) -> io::Result<Self> {
        let path = path.into();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = thread::Builder::new()
            .name("store-watcher".to_string())
            .spawn(move || watch_loop(&path, debounce, poll, &flag, &tx))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    path: &Path,
    debounce: Duration,
    poll: Duration,
    stop: &AtomicBool,
    tx: &Sender<WatchEvent>,
) {
    let mut reported = file_identity(path);
    let mut candidate: Option<(Option<FileIdentity>, Instant)> = None;
    info!(path = %path.display(), "watching store");

    while !stop.load(Ordering::Acquire) {
        thread::sleep(poll);
        let current = file_identity(path);

        if current == reported {
            candidate = None;
            continue;
        }

        match candidate {
            Some((seen, since)) if seen == current => {
                if since.elapsed() < debounce {
                    continue;
                }
            }
            _ => {
                candidate = Some((current, Instant::now()));
                if !debounce.is_zero() {
                    continue;
                }
            }
        }

        let event = if current.is_some() {
            WatchEvent::Replaced
        } else {
            WatchEvent::Removed
        };
        debug!(path = %path.display(), ?event, "store changed");
        reported = current;
        candidate = None;
        if tx.send(event).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(10);

    #[test]
    fn test_reports_removal_then_replacement() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.db");
        fs::write(&path, b"one").unwrap();

        let (tx, rx) = mpsc::channel();
        let _watcher = StoreWatcher::spawn(&path, Duration::from_millis(50), POLL, tx).unwrap();

        fs::remove_file(&path).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), WatchEvent::Removed);

        fs::write(&path, b"two").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), WatchEvent::Replaced);
    }

    #[test]
    fn test_burst_is_debounced_into_one_event() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.db");
        fs::write(&path, b"one").unwrap();

        let (tx, rx) = mpsc::channel();
        let _watcher = StoreWatcher::spawn(&path, Duration::from_millis(300), POLL, tx).unwrap();

        // Staged first so the new file cannot reuse the old inode
        let staged = dir.path().join("run.db.new");
        fs::write(&staged, b"two").unwrap();
        fs::remove_file(&path).unwrap();
        thread::sleep(Duration::from_millis(30));
        fs::rename(&staged, &path).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), WatchEvent::Replaced);
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    }

    #[test]
    fn test_unchanged_file_is_quiet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.db");
        fs::write(&path, b"one").unwrap();

        let (tx, rx) = mpsc::channel();
        let mut watcher = StoreWatcher::spawn(&path, Duration::from_millis(20), POLL, tx).unwrap();
        fs::write(&path, b"one more").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        watcher.stop();
    }
}
