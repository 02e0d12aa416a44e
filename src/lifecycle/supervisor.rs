//! Server-side lifecycle loop
//!
//! Owns the store connection's lifecycle inside the server process: it
//! answers the client's control signals, reacts to the store watcher, and
//! publishes every transition to the status file.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::event_store::StoreHandle;

use super::signal::ControlSignals;
use super::status::{write_status, ServerStatus};
use super::watcher::{file_identity, FileIdentity, StoreWatcher, WatchEvent};
use super::{LifecycleError, LifecycleState, StateMachine};

pub struct Supervisor {
    config: ServerConfig,
    store: Arc<StoreHandle>,
    machine: Arc<StateMachine>,
    signals: ControlSignals,
    /// Identity of the file behind the open connection
    opened: Option<FileIdentity>,
    watcher: Option<(StoreWatcher, Receiver<WatchEvent>)>,
}

impl Supervisor {
    pub fn new(config: ServerConfig, store: Arc<StoreHandle>, machine: Arc<StateMachine>) -> Self {
        let signals = ControlSignals::new(&config);
        Self {
            config,
            store,
            machine,
            signals,
            opened: None,
            watcher: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.machine.current()
    }

    fn publish(&self) {
        let status = ServerStatus::current(
            self.machine.current(),
            self.store.path(),
            self.store.is_attached(),
        );
        if let Err(e) = write_status(&self.config.status_path(), &status) {
            warn!(error = %e, "could not write status file");
        }
    }

    fn transition(&self, next: LifecycleState) -> Result<(), LifecycleError> {
        self.machine.transition(next)?;
        self.publish();
        Ok(())
    }

    /// Open the store if present; errors leave the store detached
    fn attach(&mut self) -> bool {
        match self.store.attach() {
            Ok(true) => {
                self.opened = file_identity(self.store.path());
                true
            }
            Ok(false) => {
                info!(path = %self.store.path().display(), "store not present yet");
                false
            }
            Err(e) => {
                error!(path = %self.store.path().display(), error = %e, "could not open store");
                false
            }
        }
    }

    fn detach(&mut self) {
        self.store.detach();
        self.opened = None;
    }

    /// Clear stale signals, open the store and start watching it
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.signals.clear_all();
        self.transition(LifecycleState::Starting)?;

        self.attach();

        let (tx, rx) = mpsc::channel();
        let watcher = StoreWatcher::spawn(
            self.store.path(),
            self.config.watch_debounce,
            self.config.poll_interval,
            tx,
        )?;
        self.watcher = Some((watcher, rx));

        self.transition(LifecycleState::Running)?;
        Ok(())
    }

    /// Release the connection for cleanup and wait for the store to come back
    fn release_store(&mut self) -> Result<(), LifecycleError> {
        if self.machine.current() != LifecycleState::Running {
            return Ok(());
        }
        self.detach();
        self.transition(LifecycleState::Reconnecting)
    }

    /// Reopen the store and resume serving
    fn reconnect(&mut self) -> Result<(), LifecycleError> {
        match self.machine.current() {
            LifecycleState::Reconnecting => {
                self.attach();
                self.transition(LifecycleState::Running)
            }
            LifecycleState::Running if !self.store.is_attached() => {
                self.attach();
                self.publish();
                Ok(())
            }
            _ => {
                self.publish();
                Ok(())
            }
        }
    }

    fn handle_watch_event(&mut self, event: WatchEvent) -> Result<(), LifecycleError> {
        match event {
            WatchEvent::Removed => {
                info!("store file removed");
                self.release_store()
            }
            WatchEvent::Replaced => {
                let current = file_identity(self.store.path());
                if current.is_some() && current == self.opened {
                    return Ok(());
                }
                info!("store file replaced");
                if self.machine.current() == LifecycleState::Running && self.store.is_attached() {
                    self.release_store()?;
                }
                self.reconnect()
            }
        }
    }

    /// One pass over the signals and watcher; false once shutdown is requested
    pub fn poll_once(&mut self) -> Result<bool, LifecycleError> {
        if self.signals.shutdown.consume() {
            info!("shutdown requested");
            return Ok(false);
        }
        if self.signals.release_store.consume() {
            info!("store release requested");
            self.release_store()?;
        }
        if self.signals.store_ready.consume() {
            info!("store ready");
            self.reconnect()?;
        }

        loop {
            let next = match &self.watcher {
                Some((_, rx)) => rx.try_recv(),
                None => break,
            };
            match next {
                Ok(event) => self.handle_watch_event(event)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("store watcher stopped");
                    self.watcher = None;
                    break;
                }
            }
        }
        Ok(true)
    }

    /// Serve until a shutdown signal arrives or `stop` is set
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), LifecycleError> {
        while !stop.load(Ordering::Acquire) {
            if !self.poll_once()? {
                break;
            }
            thread::sleep(self.config.poll_interval);
        }
        self.shutdown()
    }

    /// Stop watching, close the store and publish `Stopped`
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        if let Some((mut watcher, _)) = self.watcher.take() {
            watcher.stop();
        }
        match self.machine.current() {
            LifecycleState::Running | LifecycleState::Reconnecting => {
                self.transition(LifecycleState::ShuttingDown)?;
            }
            LifecycleState::Stopped => return Ok(()),
            _ => {}
        }
        self.detach();
        self.signals.shutdown.clear();
        self.transition(LifecycleState::Stopped)?;
        info!("server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::{cleanup_store, EventStore};
    use crate::lifecycle::status::read_status;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Supervisor, Arc<StoreHandle>, ServerConfig) {
        let config = ServerConfig::default()
            .with_runtime_dir(dir.path().join("rt"))
            .with_instance("sup")
            .with_watch_debounce(Duration::from_millis(20));
        let store_path = dir.path().join("trace.db");
        EventStore::open(&store_path).unwrap().close().unwrap();
        let store = Arc::new(StoreHandle::detached(&store_path));
        let supervisor = Supervisor::new(config.clone(), store.clone(), Arc::new(StateMachine::new()));
        (supervisor, store, config)
    }

    #[test]
    fn test_release_and_ready_signals() {
        let dir = TempDir::new().unwrap();
        let (mut supervisor, store, config) = setup(&dir);
        supervisor.start().unwrap();
        assert!(store.is_attached());
        assert_eq!(read_status(&config.status_path()).unwrap().state, LifecycleState::Running);

        let signals = ControlSignals::new(&config);
        signals.release_store.signal().unwrap();
        assert!(supervisor.poll_once().unwrap());
        assert_eq!(supervisor.state(), LifecycleState::Reconnecting);
        assert!(!store.is_attached());
        let status = read_status(&config.status_path()).unwrap();
        assert!(!status.connected);

        signals.store_ready.signal().unwrap();
        supervisor.poll_once().unwrap();
        assert_eq!(supervisor.state(), LifecycleState::Running);
        assert!(store.is_attached());

        signals.shutdown.signal().unwrap();
        assert!(!supervisor.poll_once().unwrap());
        supervisor.shutdown().unwrap();
        assert_eq!(supervisor.state(), LifecycleState::Stopped);
        assert_eq!(read_status(&config.status_path()).unwrap().state, LifecycleState::Stopped);
    }

    #[test]
    fn test_watcher_reconnects_on_replacement() {
        let dir = TempDir::new().unwrap();
        let (mut supervisor, store, _config) = setup(&dir);
        supervisor.start().unwrap();

        supervisor.signals.release_store.signal().unwrap();
        supervisor.poll_once().unwrap();

        // Build the replacement beside the old file so it gets a fresh inode
        let staged = dir.path().join("staged.db");
        EventStore::open(&staged).unwrap().close().unwrap();
        assert!(cleanup_store(store.path(), Default::default()).success);
        std::fs::rename(&staged, store.path()).unwrap();

        let mut reattached = false;
        for _ in 0..200 {
            supervisor.poll_once().unwrap();
            if supervisor.state() == LifecycleState::Running && store.is_attached() {
                reattached = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(reattached);
    }

    #[test]
    fn test_missing_store_starts_detached() {
        let dir = TempDir::new().unwrap();
        let (mut supervisor, store, _config) = setup(&dir);
        assert!(cleanup_store(store.path(), Default::default()).success);

        supervisor.start().unwrap();
        assert_eq!(supervisor.state(), LifecycleState::Running);
        assert!(!store.is_attached());

        supervisor.signals.store_ready.signal().unwrap();
        supervisor.poll_once().unwrap();
        assert!(!store.is_attached());

        EventStore::open(store.path()).unwrap().close().unwrap();
        supervisor.signals.store_ready.signal().unwrap();
        supervisor.poll_once().unwrap();
        assert!(store.is_attached());
    }
}
