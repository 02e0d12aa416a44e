//! Shared, reconnectable access to the store

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use super::store::{EventStore, StoreError, StoreResult};

/// Holds the query server's connection, which may be released and re-attached
///
/// Readers share the inner store through a read guard. `detach` takes the
/// write guard, so it waits for in-flight queries to finish before closing.
pub struct StoreHandle {
    path: PathBuf,
    store: RwLock<Option<EventStore>>,
}

impl StoreHandle {
    /// A handle with no open connection
    pub fn detached(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store: RwLock::new(None),
        }
    }

    /// A handle wrapping an already-open store
    pub fn from_store(store: EventStore) -> Self {
        Self {
            path: store.path().to_path_buf(),
            store: RwLock::new(Some(store)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_attached(&self) -> bool {
        self.store.read().is_some()
    }

    /// Open the store file if it exists; a missing file leaves the handle detached
    pub fn attach(&self) -> StoreResult<bool> {
        let mut guard = self.store.write();
        if guard.is_some() {
            return Ok(true);
        }
        match EventStore::open_existing(&self.path) {
            Ok(store) => {
                *guard = Some(store);
                Ok(true)
            }
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Close the connection after in-flight reads complete
    pub fn detach(&self) {
        let taken = self.store.write().take();
        if let Some(store) = taken {
            if let Err(e) = store.close() {
                warn!(error = %e, "error closing store");
            }
            info!(path = %self.path.display(), "store released");
        }
    }

    /// Run `f` against the open store, or `None` while detached
    pub fn with_store<T>(&self, f: impl FnOnce(&EventStore) -> T) -> Option<T> {
        let guard = self.store.read();
        guard.as_ref().map(f)
    }
}
