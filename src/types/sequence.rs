//! Causal chain types

use serde::{Deserialize, Serialize};

use super::{EventKind, EventRecord, Pagination, QueryMetadata};

/// Chain query: one root, or discover every root
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceQuery {
    pub run_id: Option<String>,
    /// When absent, every parentless event is a root
    pub root_event_id: Option<String>,
    /// Restrict discovered roots to this kind
    pub root_kind: Option<EventKind>,
    /// Kinds a chain must contain to count as complete
    pub pattern: Vec<EventKind>,
    pub include_incomplete: bool,
    pub max_depth: Option<usize>,
    pub pagination: Pagination,
}

impl SequenceQuery {
    pub fn from_root(root_event_id: impl Into<String>) -> Self {
        Self {
            root_event_id: Some(root_event_id.into()),
            ..Self::discover()
        }
    }

    pub fn discover() -> Self {
        Self {
            run_id: None,
            root_event_id: None,
            root_kind: None,
            pattern: Vec::new(),
            include_incomplete: true,
            max_depth: None,
            pagination: Pagination::default(),
        }
    }

    pub fn with_pattern(mut self, pattern: Vec<EventKind>) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_root_kind(mut self, kind: EventKind) -> Self {
        self.root_kind = Some(kind);
        self
    }

    pub fn complete_only(mut self) -> Self {
        self.include_incomplete = false;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }
}

/// A root and its descendants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventChain {
    pub root: EventRecord,
    /// Descendants within the depth limit, by timestamp then sequence id
    pub events: Vec<EventRecord>,
    /// Deepest level reached below the root
    pub depth: usize,
    /// Distinct kinds in the chain, root included
    pub kinds: Vec<EventKind>,
    pub complete: bool,
    #[serde(rename = "missingKinds")]
    pub missing_kinds: Vec<EventKind>,
    /// Descendants exist below the depth limit
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceResult {
    pub chains: Vec<EventChain>,
    pub metadata: QueryMetadata,
}
