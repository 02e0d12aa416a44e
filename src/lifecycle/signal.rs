//! Named cross-process wait handles
//!
//! A signal is a marker file in the runtime directory. Signalling creates
//! it and the waiting process consumes it by removing the file, so exactly
//! one waiter observes each signal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::ServerConfig;
use crate::utils::atomic_write;

#[derive(Debug, Clone)]
pub struct NamedSignal {
    name: &'static str,
    path: PathBuf,
}

impl NamedSignal {
    pub fn new(name: &'static str, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raise the signal
    pub fn signal(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&self.path, std::process::id().to_string().as_bytes())?;
        debug!(signal = self.name, "signal raised");
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    /// Take the signal if raised
    pub fn consume(&self) -> bool {
        fs::remove_file(&self.path).is_ok()
    }

    pub fn clear(&self) {
        let _ = fs::remove_file(&self.path);
    }

    /// Block until the signal is raised and consumed, or `timeout` passes
    pub fn wait(&self, timeout: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.consume() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(poll);
        }
    }
}

/// The signals a client can send to the server of one instance
#[derive(Debug, Clone)]
pub struct ControlSignals {
    pub shutdown: NamedSignal,
    /// Close the store connection and stay alive
    pub release_store: NamedSignal,
    /// Reopen the store
    pub store_ready: NamedSignal,
}

impl ControlSignals {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            shutdown: NamedSignal::new("shutdown", config.signal_path("shutdown")),
            release_store: NamedSignal::new("release_store", config.signal_path("release")),
            store_ready: NamedSignal::new("store_ready", config.signal_path("ready")),
        }
    }

    /// Drop signals left over from a previous server
    pub fn clear_all(&self) {
        self.shutdown.clear();
        self.release_store.clear();
        self.store_ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_signal_is_consumed_once() {
        let dir = TempDir::new().unwrap();
        let signal = NamedSignal::new("shutdown", dir.path().join("sim.shutdown"));

        assert!(!signal.consume());
        signal.signal().unwrap();
        assert!(signal.is_set());
        assert!(signal.consume());
        assert!(!signal.consume());
    }

    #[test]
    fn test_wait_sees_signal_from_other_thread() {
        let dir = TempDir::new().unwrap();
        let signal = Arc::new(NamedSignal::new("ready", dir.path().join("sim.ready")));

        let raiser = {
            let signal = signal.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                signal.signal().unwrap();
            })
        };

        assert!(signal.wait(Duration::from_secs(2), Duration::from_millis(5)));
        raiser.join().unwrap();
        assert!(!signal.is_set());
    }

    #[test]
    fn test_wait_times_out() {
        let dir = TempDir::new().unwrap();
        let signal = NamedSignal::new("ready", dir.path().join("sim.ready"));
        assert!(!signal.wait(Duration::from_millis(20), Duration::from_millis(5)));
    }

    #[test]
    fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::default().with_runtime_dir(dir.path());
        let signals = ControlSignals::new(&config);
        signals.shutdown.signal().unwrap();
        signals.store_ready.signal().unwrap();

        signals.clear_all();
        assert!(!signals.shutdown.is_set());
        assert!(!signals.store_ready.is_set());
    }
}
