//! Utility functions and helpers
//!
//! Timestamp conversion, atomic status-file writes and logging setup.

pub mod atomic;
pub mod logging;
pub mod time;

pub use atomic::{atomic_write, atomic_write_json};
pub use logging::init_logging;
pub use time::{elapsed_ms, format_micros, now_micros, parse_datetime_micros};
