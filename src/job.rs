use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::payload::JobCall;

/// One entry of a job's state history, in the order the states occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub data: Option<HashMap<String, String>>,
    pub occurred_at_ms: i64,
}

/// A persisted job as stored by the host scheduler. This layer only reads
/// these records; the scheduler owns their lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    /// Opaque serialized call descriptor, JSON-encoded by the host.
    #[serde(default)]
    pub invocation_data: Option<String>,
    /// Serialized argument list bound into the call descriptor on read.
    #[serde(default)]
    pub arguments: Option<String>,
    pub created_at_ms: i64,
    #[serde(default)]
    pub expire_at_ms: Option<i64>,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub state_history: Vec<StateHistoryEntry>,
}

impl JobRecord {
    /// The history entry for the given state name, if the job ever entered it.
    pub fn history_entry(&self, state_name: &str) -> Option<&StateHistoryEntry> {
        self.state_history.iter().find(|s| s.name == state_name)
    }
}

/// Projection of a `JobRecord` plus the historical state entry matching a
/// requested state name. Built transiently for a single query response.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub id: String,
    pub invocation_data: Option<String>,
    pub arguments: Option<String>,
    pub created_at_ms: i64,
    pub expire_at_ms: Option<i64>,
    pub state_name: Option<String>,
    pub state_reason: Option<String>,
    pub state_data: Option<HashMap<String, String>>,
}

impl JobSummary {
    /// Build a summary, attaching the history entry for `state_name` when the
    /// name is non-empty and present in the job's history.
    pub fn for_state(record: &JobRecord, state_name: &str) -> Self {
        let state = if state_name.is_empty() {
            None
        } else {
            record.history_entry(state_name)
        };
        Self {
            id: record.id.clone(),
            invocation_data: record.invocation_data.clone(),
            arguments: record.arguments.clone(),
            created_at_ms: record.created_at_ms,
            expire_at_ms: record.expire_at_ms,
            state_name: record.state_name.clone(),
            state_reason: state.and_then(|s| s.reason.clone()),
            state_data: state.and_then(|s| s.data.clone()),
        }
    }
}

/// A tag value with its occurrence count and percentage share among the
/// scanned tag rows. Recomputed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagStat {
    pub tag: String,
    pub amount: u64,
    pub percentage: i64,
}

/// Result unit of a tag search query: the deserialized call (when it could
/// be resolved) plus the job's current state name.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingJob {
    pub job: Option<JobCall>,
    pub state: Option<String>,
}
