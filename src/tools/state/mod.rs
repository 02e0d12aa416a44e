//! Point-in-time state tools

mod get_state_delta;
mod get_state_snapshot;

pub use get_state_delta::GetStateDeltaTool;
pub use get_state_snapshot::GetStateSnapshotTool;
