//! Run metadata

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{QueryMetadata, Timestamp};

/// One simulation execution. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "startTime")]
    pub start_time: Timestamp,
    #[serde(rename = "endTime")]
    pub end_time: Timestamp,
    /// Content hash of the run configuration, for reproducibility audits
    #[serde(rename = "configHash")]
    pub config_hash: String,
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
}

impl Run {
    /// Create a run stamped with the current time
    pub fn new(
        run_id: impl Into<String>,
        start_time: Timestamp,
        end_time: Timestamp,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            start_time,
            end_time,
            config_hash: config_hash.into(),
            created_at: Timestamp::now(),
        }
    }

    /// SHA-256 (hex) of the configuration's canonical JSON text
    ///
    /// Object keys serialize in sorted order, so two configs with the same
    /// content hash identically regardless of how they were built.
    pub fn hash_config(config: &Value) -> String {
        let canonical = config.to_string();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// A run plus a summary of the events logged under it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub run: Run,
    #[serde(rename = "eventCount")]
    pub event_count: u64,
    #[serde(rename = "firstEventAt", skip_serializing_if = "Option::is_none")]
    pub first_event_at: Option<Timestamp>,
    #[serde(rename = "lastEventAt", skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<Timestamp>,
}

/// Response of the run listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunList {
    pub runs: Vec<RunSummary>,
    pub metadata: QueryMetadata,
}
