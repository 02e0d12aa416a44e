//! Event listing tools

mod get_events_by_entity;
mod get_events_by_kind;
mod list_runs;

pub use get_events_by_entity::GetEventsByEntityTool;
pub use get_events_by_kind::GetEventsByKindTool;
pub use list_runs::ListRunsTool;
