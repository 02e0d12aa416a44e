//! Client-side control of the query server
//!
//! Used by the producer process: make sure a server is running, have it let
//! go of the store around cleanup, and stop it.

use std::ffi::OsString;
use std::path::Path;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

use super::instance_lock::InstanceLock;
use super::signal::ControlSignals;
use super::spawn::spawn_detached;
use super::status::{read_status, ServerStatus};
use super::{LifecycleError, LifecycleState};

pub struct LifecycleManager {
    config: ServerConfig,
    signals: ControlSignals,
    /// Server spawned by this manager, reaped on shutdown
    child: Mutex<Option<Child>>,
}

impl LifecycleManager {
    pub fn new(config: ServerConfig) -> Self {
        let signals = ControlSignals::new(&config);
        Self {
            config,
            signals,
            child: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether a server holds the instance lock
    pub fn is_running(&self) -> Result<bool, LifecycleError> {
        InstanceLock::is_held(self.config.lock_path())
    }

    pub fn status(&self) -> Option<ServerStatus> {
        read_status(&self.config.status_path())
    }

    /// Poll `check` until it holds or `timeout` passes
    fn wait_until(
        &self,
        timeout: Duration,
        mut check: impl FnMut() -> Result<bool, LifecycleError>,
    ) -> Result<bool, LifecycleError> {
        let deadline = Instant::now() + timeout;
        loop {
            if check()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Lock held and the server has published a serving state
    fn is_ready(&self) -> Result<bool, LifecycleError> {
        let serving = self.status().is_some_and(|s| {
            matches!(s.state, LifecycleState::Running | LifecycleState::Reconnecting)
        });
        Ok(serving && self.is_running()?)
    }

    /// Start a server for `store_path` unless one is already running
    ///
    /// A held instance lock counts as success, so concurrent callers never
    /// end up with two servers. Only a server spawned here is waited on.
    pub fn ensure_running(&self, store_path: &Path) -> Result<(), LifecycleError> {
        let mut child_slot = self.child.lock();
        if self.is_running()? {
            debug!("server already running");
            return Ok(());
        }

        let mut child = self.spawn_server(store_path)?;
        let deadline = Instant::now() + self.config.startup_timeout;
        loop {
            if self.is_ready()? {
                info!(pid = child.id(), "server is up");
                *child_slot = Some(child);
                return Ok(());
            }
            if let Some(status) = child.try_wait()? {
                if self.is_running()? {
                    // Lost a startup race to another server
                    debug!(%status, "spawned server yielded to another instance");
                    return Ok(());
                }
                return Err(LifecycleError::ServerExited(status.to_string()));
            }
            if Instant::now() >= deadline {
                warn!(pid = child.id(), "server did not come up in time");
                let _ = child.kill();
                let _ = child.wait();
                return Err(LifecycleError::StartupTimeout(self.config.startup_timeout));
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn spawn_server(&self, store_path: &Path) -> Result<Child, LifecycleError> {
        let program = self
            .config
            .resolve_server_program()
            .ok_or(LifecycleError::ServerNotFound)?;
        let args: Vec<OsString> = vec![
            store_path.as_os_str().to_owned(),
            "--runtime-dir".into(),
            self.config.runtime_dir.as_os_str().to_owned(),
            "--instance".into(),
            self.config.instance.clone().into(),
            "--detached".into(),
        ];
        spawn_detached(&program, &args, &self.config.log_path())
    }

    /// Ask the server to close its store connection; `false` when none runs
    pub fn prepare_for_cleanup(&self) -> Result<bool, LifecycleError> {
        if !self.is_running()? {
            return Ok(false);
        }
        self.signals.release_store.signal()?;
        let released = self.wait_until(self.config.reconnect_timeout, || {
            Ok(self
                .status()
                .is_some_and(|s| s.state == LifecycleState::Reconnecting && !s.connected))
        })?;
        if !released {
            return Err(LifecycleError::ReconnectTimeout(self.config.reconnect_timeout));
        }
        info!("server released the store");
        Ok(true)
    }

    /// Tell the server the store is back; `false` when none runs
    pub fn notify_store_ready(&self) -> Result<bool, LifecycleError> {
        if !self.is_running()? {
            return Ok(false);
        }
        self.signals.store_ready.signal()?;
        let resumed = self.wait_until(self.config.reconnect_timeout, || {
            Ok(self
                .status()
                .is_some_and(|s| s.state == LifecycleState::Running))
        })?;
        if !resumed {
            return Err(LifecycleError::ReconnectTimeout(self.config.reconnect_timeout));
        }
        Ok(true)
    }

    /// Raise the shutdown signal without waiting; `false` when none runs
    pub fn signal_shutdown(&self) -> Result<bool, LifecycleError> {
        if !self.is_running()? {
            return Ok(false);
        }
        self.signals.shutdown.signal()?;
        Ok(true)
    }

    /// Stop the server and wait for it to release the lock
    pub fn shutdown(&self) -> Result<bool, LifecycleError> {
        if !self.signal_shutdown()? {
            self.reap();
            return Ok(false);
        }
        let stopped = self.wait_until(self.config.shutdown_timeout, || Ok(!self.is_running()?))?;
        if !stopped {
            return Err(LifecycleError::ShutdownTimeout(self.config.shutdown_timeout));
        }
        self.reap();
        info!("server shut down");
        Ok(true)
    }

    fn reap(&self) {
        let taken = self.child.lock().take();
        if let Some(mut child) = taken {
            match child.try_wait() {
                Ok(Some(_)) => {}
                Ok(None) => {
                    // Lock is gone, so the process is on its way out
                    thread::sleep(self.config.poll_interval);
                    if let Ok(None) = child.try_wait() {
                        *self.child.lock() = Some(child);
                    }
                }
                Err(e) => warn!(error = %e, "could not reap server process"),
            }
        }
    }
}
