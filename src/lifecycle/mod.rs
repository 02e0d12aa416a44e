//! Lifecycle Manager - one query server per instance, across processes
//!
//! - `InstanceLock`: named OS lock; holding it is what "running" means
//! - `LifecycleManager`: client side (ensure running, release/reopen store, shutdown)
//! - `Supervisor`: server side (signals, store watcher, status file)
//!
//! # Reconnect sequence
//!
//! ```text
//! producer                          server
//! ─────────────────────────────     ──────────────────────────────────
//! prepare_for_cleanup() ──signal──► release_store: close connection
//!        ◄────────────status file── Reconnecting, connected = false
//! cleanup_store(), create new run
//! notify_store_ready()  ──signal──► store_ready: reopen connection
//!        ◄────────────status file── Running
//! ```

mod instance_lock;
mod manager;
mod signal;
mod spawn;
mod state;
mod status;
mod supervisor;
mod watcher;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

pub use instance_lock::InstanceLock;
pub use manager::LifecycleManager;
pub use signal::{ControlSignals, NamedSignal};
pub use spawn::spawn_detached;
pub use state::{LifecycleState, StateMachine};
pub use status::{read_status, write_status, ServerStatus};
pub use supervisor::Supervisor;
pub use watcher::{file_identity, FileIdentity, StoreWatcher, WatchEvent};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("server did not start within {0:?}")]
    StartupTimeout(Duration),
    #[error("server did not shut down within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("server did not acknowledge the store change within {0:?}")]
    ReconnectTimeout(Duration),
    #[error("server exited during startup ({0})")]
    ServerExited(String),
    #[error("server binary not found; set TRACE_QUERY_SERVER_BIN")]
    ServerNotFound,
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("instance lock error: {0}")]
    Lock(#[source] io::Error),
    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}
