//! Write-time payload validation
//!
//! This module provides soft validation of event payloads against the fields
//! each event kind is expected to carry.

mod payload;

pub use payload::{merge_issues, required_fields, validate_payload, FieldType, REQUIRED_FIELDS};
