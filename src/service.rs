//! The storage-facing contract consumed by dashboard and query callers.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::job::{MatchingJob, TagStat};
use crate::store::{TagStore, TagStoreError};
use crate::transaction::{TagsTransaction, WriteTransaction};

/// Default page size for per-state counts.
pub const DEFAULT_STATE_COUNT_PAGE: usize = 50;

/// Host-boundary trait identifying a storage backend instance.
pub trait JobStorageHandle: Send + Sync + 'static {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl JobStorageHandle for TagStore {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Tag query and write entry point over one `TagStore`.
pub struct TagsServiceStorage {
    store: Arc<TagStore>,
}

impl TagsServiceStorage {
    /// Build the service directly over its backend.
    pub fn new(store: Arc<TagStore>) -> Self {
        Self { store }
    }

    /// Build the service from an opaque host storage handle. Fails when the
    /// handle belongs to a different backend; the service is not generic.
    pub fn from_storage(storage: Arc<dyn JobStorageHandle>) -> Result<Self, TagStoreError> {
        let store = storage
            .as_any()
            .downcast::<TagStore>()
            .map_err(|_| TagStoreError::IncompatibleStorage)?;
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &Arc<TagStore> {
        &self.store
    }

    /// Wrap a host write transaction in the tags adapter. Fails when the
    /// transaction does not belong to this backend.
    pub fn transaction<'a>(
        &self,
        transaction: &'a mut dyn WriteTransaction,
    ) -> Result<TagsTransaction<'a>, TagStoreError> {
        TagsTransaction::new(transaction)
    }

    pub async fn tags_count(&self) -> Result<u64, TagStoreError> {
        self.store.tags_count().await
    }

    pub async fn search_tags(
        &self,
        tag_prefix: &str,
        scope: Option<&str>,
    ) -> Result<Vec<String>, TagStoreError> {
        self.store.search_tags(tag_prefix, scope).await
    }

    pub async fn search_weighted_tags(
        &self,
        tag_prefix: &str,
        scope: Option<&str>,
    ) -> Result<Vec<TagStat>, TagStoreError> {
        self.store.search_weighted_tags(tag_prefix, scope).await
    }

    pub async fn job_count(&self, tags: &[&str], state_name: &str) -> Result<u64, TagStoreError> {
        self.store.job_count(tags, state_name).await
    }

    /// Per-state counts over the first `DEFAULT_STATE_COUNT_PAGE` resolved
    /// references.
    pub async fn job_state_count(
        &self,
        tags: &[&str],
    ) -> Result<HashMap<String, u64>, TagStoreError> {
        self.store
            .job_state_count(tags, DEFAULT_STATE_COUNT_PAGE, 0)
            .await
    }

    pub async fn job_state_count_page(
        &self,
        tags: &[&str],
        max_results: usize,
        offset: usize,
    ) -> Result<HashMap<String, u64>, TagStoreError> {
        self.store.job_state_count(tags, max_results, offset).await
    }

    pub async fn matching_jobs(
        &self,
        tags: &[&str],
        offset: usize,
        count: usize,
        state_name: &str,
    ) -> Result<Vec<(String, Option<MatchingJob>)>, TagStoreError> {
        self.store
            .matching_jobs(tags, offset, count, state_name)
            .await
    }
}
