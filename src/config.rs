//! Server and lifecycle configuration
//!
//! Every value has a default; `from_env` applies `TRACE_QUERY_*` overrides.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::event_store::CleanupPolicy;
use crate::query::QueryLimits;

pub const DEFAULT_INSTANCE: &str = "trace-query";

/// Name of the server binary looked up next to the current executable
pub const SERVER_BIN_NAME: &str = "trace-query-server";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding the lock, signal, status and log files
    pub runtime_dir: PathBuf,
    /// Name shared by every process that coordinates on one server
    pub instance: String,
    pub startup_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// How long a client waits for the server to release or reopen the store
    pub reconnect_timeout: Duration,
    pub watch_debounce: Duration,
    /// Poll period for signals, the watcher and client-side waits
    pub poll_interval: Duration,
    /// Explicit server binary; otherwise resolved from the environment
    pub server_program: Option<PathBuf>,
    pub cleanup: CleanupPolicy,
    pub limits: QueryLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            runtime_dir: env::temp_dir().join(DEFAULT_INSTANCE),
            instance: DEFAULT_INSTANCE.to_string(),
            startup_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            reconnect_timeout: Duration::from_secs(5),
            watch_debounce: Duration::from_millis(500),
            poll_interval: Duration::from_millis(50),
            server_program: None,
            cleanup: CleanupPolicy::default(),
            limits: QueryLimits::default(),
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    let value = env::var(name).ok()?;
    match value.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!(variable = name, value = %value, "ignoring non-numeric duration");
            None
        }
    }
}

impl ServerConfig {
    /// Defaults with `TRACE_QUERY_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("TRACE_QUERY_RUNTIME_DIR") {
            config.runtime_dir = PathBuf::from(dir);
        }
        if let Ok(instance) = env::var("TRACE_QUERY_INSTANCE") {
            if !instance.trim().is_empty() {
                config.instance = instance.trim().to_string();
            }
        }
        if let Some(timeout) = env_millis("TRACE_QUERY_STARTUP_TIMEOUT_MS") {
            config.startup_timeout = timeout;
        }
        if let Some(timeout) = env_millis("TRACE_QUERY_SHUTDOWN_TIMEOUT_MS") {
            config.shutdown_timeout = timeout;
        }
        if let Some(debounce) = env_millis("TRACE_QUERY_DEBOUNCE_MS") {
            config.watch_debounce = debounce;
        }
        if let Ok(program) = env::var("TRACE_QUERY_SERVER_BIN") {
            config.server_program = Some(PathBuf::from(program));
        }
        config
    }

    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    pub fn with_watch_debounce(mut self, debounce: Duration) -> Self {
        self.watch_debounce = debounce;
        self
    }

    pub fn with_server_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.server_program = Some(program.into());
        self
    }

    fn runtime_file(&self, suffix: &str) -> PathBuf {
        self.runtime_dir.join(format!("{}.{}", self.instance, suffix))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.runtime_file("lock")
    }

    pub fn status_path(&self) -> PathBuf {
        self.runtime_file("status.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.runtime_file("log")
    }

    /// Marker file backing a named cross-process signal
    pub fn signal_path(&self, signal: &str) -> PathBuf {
        self.runtime_file(signal)
    }

    /// Server binary: explicit setting, else a sibling of the current executable
    pub fn resolve_server_program(&self) -> Option<PathBuf> {
        if let Some(program) = &self.server_program {
            return Some(program.clone());
        }
        let exe = env::current_exe().ok()?;
        let file_name = format!("{}{}", SERVER_BIN_NAME, env::consts::EXE_SUFFIX);
        if exe.file_name().is_some_and(|name| name == file_name.as_str()) {
            return Some(exe);
        }
        // Test binaries live one level below the built executables
        exe.ancestors()
            .skip(1)
            .take(2)
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.instance, "trace-query");
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.watch_debounce, Duration::from_millis(500));
        assert_eq!(config.cleanup.max_attempts, 5);
        assert_eq!(config.limits.max_page_size, 1000);
    }

    #[test]
    fn test_runtime_paths() {
        let config = ServerConfig::default()
            .with_runtime_dir("/run/tq")
            .with_instance("sim");
        assert_eq!(config.lock_path(), PathBuf::from("/run/tq/sim.lock"));
        assert_eq!(config.status_path(), PathBuf::from("/run/tq/sim.status.json"));
        assert_eq!(config.signal_path("shutdown"), PathBuf::from("/run/tq/sim.shutdown"));
    }

    #[test]
    fn test_explicit_program_wins() {
        let config = ServerConfig::default().with_server_program("/opt/bin/server");
        assert_eq!(
            config.resolve_server_program(),
            Some(PathBuf::from("/opt/bin/server"))
        );
    }
}
