//! Tag index queries, built entirely from prefix scans and exact-key gets
//! over the unindexed keyspace.
//!
//! Result ordering everywhere follows whatever order the store yields the
//! first tag's entries. It is unstable and NOT creation order; callers must
//! not rely on it.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::job::{JobRecord, JobSummary, MatchingJob, TagStat};
use crate::keys::{
    ParsedTagEntry, TAG_ROOT, all_tags_prefix, parse_all_tags_entry_key, parse_tag_entry_key,
    scoped_tags_prefix, tag_entry_key,
};
use crate::payload::project_jobs;
use crate::store::{TagStore, TagStoreError};

/// Callers may supply tag names with or without the namespace prefix.
fn normalize_tag(tag: &str) -> &str {
    tag.strip_prefix("tags:").unwrap_or(tag)
}

impl TagStore {
    /// Total number of rows in the flat all-tags index, i.e. the number of
    /// distinct tag values ever written.
    pub async fn tags_count(&self) -> Result<u64, TagStoreError> {
        let entries = self.scan_set_entries(&all_tags_prefix()).await?;
        let count = entries
            .iter()
            .filter(|entry| parse_all_tags_entry_key(&entry.key).is_some())
            .count();
        Ok(count as u64)
    }

    /// Every tag value starting with `tag_prefix` under the scope, one
    /// element per job-tag row: a tag carried by three jobs appears three
    /// times. An empty prefix matches all tags.
    pub async fn search_tags(
        &self,
        tag_prefix: &str,
        scope: Option<&str>,
    ) -> Result<Vec<String>, TagStoreError> {
        let tag_prefix = normalize_tag(tag_prefix);
        let grouped = self
            .tags_by_value(scope, |value| value.starts_with(tag_prefix))
            .await?;
        let mut out = Vec::new();
        for (_, rows) in grouped {
            for row in rows {
                out.push(row.value);
            }
        }
        Ok(out)
    }

    /// Tag frequency statistics over the scoped job-tag rows. `amount` is
    /// the number of rows carrying the value; `percentage` is rounded
    /// independently per group against the query-time total and is not
    /// renormalized, so percentages need not sum to exactly 100.
    pub async fn search_weighted_tags(
        &self,
        tag_prefix: &str,
        scope: Option<&str>,
    ) -> Result<Vec<TagStat>, TagStoreError> {
        let tag_prefix = normalize_tag(tag_prefix);
        let grouped = self
            .tags_by_value(scope, |value| value.starts_with(tag_prefix))
            .await?;
        let total: u64 = grouped.values().map(|rows| rows.len() as u64).sum();
        let stats = grouped
            .into_iter()
            .map(|(tag, rows)| {
                let amount = rows.len() as u64;
                let percentage = ((amount as f64 / total as f64) * 100.0).round() as i64;
                TagStat {
                    tag,
                    amount,
                    percentage,
                }
            })
            .collect();
        Ok(stats)
    }

    /// Number of jobs carrying every one of `tags`, either across all
    /// states (`state_name` empty) or in one specific state. A state absent
    /// from the grouping counts as zero, never as an error.
    pub async fn job_count(&self, tags: &[&str], state_name: &str) -> Result<u64, TagStoreError> {
        let counts = self.job_state_count(tags, usize::MAX, 0).await?;
        if state_name.is_empty() {
            Ok(counts.values().sum())
        } else {
            Ok(counts.get(state_name).copied().unwrap_or_default())
        }
    }

    /// Per-state job counts over the tag intersection, bounded to
    /// `max_results` references starting at `offset` in store order. Jobs
    /// with no recorded state are skipped.
    pub async fn job_state_count(
        &self,
        tags: &[&str],
        max_results: usize,
        offset: usize,
    ) -> Result<HashMap<String, u64>, TagStoreError> {
        let refs = self.resolve_tagged_jobs(tags).await?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in refs.iter().skip(offset).take(max_results) {
            let Some(job) = self.get_job(&entry.job_ref).await? else {
                continue;
            };
            let Some(state) = job.state_name else {
                continue;
            };
            *counts.entry(state).or_default() += 1;
        }
        Ok(counts)
    }

    /// Paginated listing of the jobs carrying every one of `tags`,
    /// optionally restricted to one state.
    ///
    /// The state filter applies before pagination: a page is a window over
    /// the filtered sequence, so adjacent pages never overlap or leave gaps.
    /// Jobs whose payload cannot be resolved keep their row with a `None`
    /// payload.
    pub async fn matching_jobs(
        &self,
        tags: &[&str],
        offset: usize,
        count: usize,
        state_name: &str,
    ) -> Result<Vec<(String, Option<MatchingJob>)>, TagStoreError> {
        let refs = self.resolve_tagged_jobs(tags).await?;
        let mut jobs: Vec<JobRecord> = Vec::with_capacity(refs.len());
        for entry in &refs {
            if let Some(job) = self.get_job(&entry.job_ref).await? {
                jobs.push(job);
            }
        }

        let summaries: Vec<JobSummary> = jobs
            .iter()
            .filter(|job| state_name.is_empty() || job.state_name.as_deref() == Some(state_name))
            .skip(offset)
            .take(count)
            .map(|job| JobSummary::for_state(job, state_name))
            .collect();
        debug!(
            tags = tags.len(),
            resolved = refs.len(),
            page = summaries.len(),
            "materializing matching jobs page"
        );

        Ok(project_jobs(&summaries, |summary, call, _state_data| {
            MatchingJob {
                job: call,
                state: summary.state_name.clone(),
            }
        }))
    }

    /// Scoped tag rows grouped by decoded tag value; rows whose key does
    /// not decode are skipped.
    async fn tags_by_value(
        &self,
        scope: Option<&str>,
        keep: impl Fn(&str) -> bool,
    ) -> Result<BTreeMap<String, Vec<ParsedTagEntry>>, TagStoreError> {
        let entries = self.scan_set_entries(&scoped_tags_prefix(scope)).await?;
        let mut grouped: BTreeMap<String, Vec<ParsedTagEntry>> = BTreeMap::new();
        for entry in entries {
            let Some(parsed) = parse_tag_entry_key(&entry.key) else {
                continue;
            };
            if keep(&parsed.value) {
                grouped.entry(parsed.value.clone()).or_default().push(parsed);
            }
        }
        Ok(grouped)
    }

    /// Resolve the job references associated with every one of `tags`.
    ///
    /// The first tag is resolved with one scan over the `tags:` namespace;
    /// each subsequent tag is checked by exact-key lookup against only the
    /// references already found, discarding any not also carrying it. An
    /// empty first fetch short-circuits everything downstream to empty.
    async fn resolve_tagged_jobs(
        &self,
        tags: &[&str],
    ) -> Result<Vec<ParsedTagEntry>, TagStoreError> {
        let Some((first, rest)) = tags.split_first() else {
            return Ok(Vec::new());
        };
        let first = normalize_tag(first);

        let entries = self.scan_set_entries(&scoped_tags_prefix(None)).await?;
        let mut found: Vec<ParsedTagEntry> = Vec::new();
        // One reference per job, even when it is tagged in several scopes
        let mut seen: HashSet<String> = HashSet::new();
        for entry in entries {
            let Some(parsed) = parse_tag_entry_key(&entry.key) else {
                continue;
            };
            if parsed.value == first && seen.insert(parsed.job_ref.clone()) {
                found.push(parsed);
            }
        }

        for tag in rest {
            let tag = normalize_tag(tag);
            if found.is_empty() {
                break;
            }
            let mut still = Vec::with_capacity(found.len());
            for candidate in found {
                let Ok(entry_key) = tag_entry_key(&candidate.scope, &candidate.job_ref, tag)
                else {
                    continue;
                };
                if self.get_set_entry(&entry_key).await?.is_some() {
                    still.push(candidate);
                }
            }
            found = still;
        }

        debug!(
            namespace = TAG_ROOT,
            tags = tags.len(),
            resolved = found.len(),
            "resolved tag intersection"
        );
        Ok(found)
    }
}
