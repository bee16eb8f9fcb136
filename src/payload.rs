//! Tolerant deserialization of persisted job payloads.
//!
//! Job records carry an opaque JSON call descriptor written by the host
//! scheduler. Listings must still render a job's id, state and timestamps
//! when that payload is corrupt or references a callable that no longer
//! exists, so everything here degrades to `None` / defaults instead of
//! returning errors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::job::JobSummary;

/// The serialized call descriptor stored in `JobRecord::invocation_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationData {
    #[serde(rename = "type")]
    pub job_type: String,
    pub method: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    /// Arguments embedded in the descriptor; superseded by the record's own
    /// argument column when present.
    #[serde(default)]
    pub arguments: Option<String>,
}

/// A resolved call: the descriptor with its argument list bound in.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCall {
    pub job_type: String,
    pub method: String,
    pub arguments: Vec<serde_json::Value>,
}

/// Parse an invocation descriptor and bind `arguments` into it.
///
/// Returns `None` when the descriptor cannot be parsed, names no method, or
/// declares a parameter list the supplied arguments do not satisfy. The
/// caller keeps the row and renders a degraded payload.
pub fn deserialize_job(invocation_data: &str, arguments: Option<&str>) -> Option<JobCall> {
    let data: InvocationData = match serde_json::from_str(invocation_data) {
        Ok(data) => data,
        Err(error) => {
            debug!(%error, "skipping unparseable invocation payload");
            return None;
        }
    };
    if data.method.is_empty() {
        return None;
    }

    let raw_arguments = arguments.or(data.arguments.as_deref()).unwrap_or("[]");
    let bound: Vec<serde_json::Value> = match serde_json::from_str(raw_arguments) {
        Ok(bound) => bound,
        Err(error) => {
            debug!(method = %data.method, %error, "skipping unparseable argument list");
            return None;
        }
    };

    // A declared parameter list the arguments don't satisfy means the backing
    // method signature has changed since the job was stored.
    if !data.parameter_types.is_empty() && data.parameter_types.len() != bound.len() {
        debug!(
            method = %data.method,
            expected = data.parameter_types.len(),
            got = bound.len(),
            "argument count does not match declared parameters"
        );
        return None;
    }

    Some(JobCall {
        job_type: data.job_type,
        method: data.method,
        arguments: bound,
    })
}

/// Case-insensitive lookup over a job's state data that reads absent keys as
/// the empty string instead of failing. State payloads written by different
/// host configurations may be missing keys the caller expects.
#[derive(Debug, Clone, Default)]
pub struct StateData {
    entries: HashMap<String, String>,
}

impl StateData {
    pub fn new(data: &HashMap<String, String>) -> Self {
        let entries = data
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();
        Self { entries }
    }

    /// The value for `key`, or `""` when absent.
    pub fn get(&self, key: &str) -> &str {
        self.entries
            .get(&key.to_lowercase())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Apply `selector` to each job summary, producing one `(job id, projected
/// value)` pair per input row in order.
///
/// Rows whose `invocation_data` is absent project to `None` but are never
/// dropped; rows whose payload fails to resolve reach the selector with a
/// `None` call so the id and state still render.
pub fn project_jobs<T, F>(summaries: &[JobSummary], mut selector: F) -> Vec<(String, Option<T>)>
where
    F: FnMut(&JobSummary, Option<JobCall>, Option<&StateData>) -> T,
{
    summaries
        .iter()
        .map(|job| {
            let projected = job.invocation_data.as_deref().map(|data| {
                let state_data = job.state_data.as_ref().map(StateData::new);
                let call = deserialize_job(data, job.arguments.as_deref());
                selector(job, call, state_data.as_ref())
            });
            (job.id.clone(), projected)
        })
        .collect()
}
