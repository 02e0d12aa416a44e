//! Status file published by the server for clients to observe

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;
use crate::utils::atomic_write_json;

use super::LifecycleState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub pid: u32,
    pub state: LifecycleState,
    pub store_path: PathBuf,
    /// Whether the store connection is open
    pub connected: bool,
    pub updated_at: Timestamp,
}

impl ServerStatus {
    pub fn current(state: LifecycleState, store_path: &Path, connected: bool) -> Self {
        Self {
            pid: std::process::id(),
            state,
            store_path: store_path.to_path_buf(),
            connected,
            updated_at: Timestamp::now(),
        }
    }
}

pub fn write_status(path: &Path, status: &ServerStatus) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    atomic_write_json(path, status)
}

/// Last published status; `None` when absent or unreadable
pub fn read_status(path: &Path) -> Option<ServerStatus> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}
