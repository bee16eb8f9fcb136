//! The SlateDB-backed store the tag index is layered over.
//!
//! The store exposes a flat, ordered keyspace with no secondary indexes;
//! everything the query layer does is built from exact-key gets and prefix
//! range scans. Row layout:
//!
//! - `sets/{entry key}`: one row per set entry, the entry key embedding the
//!   member value (`{set key}<{value}>`)
//! - `hashes/{hash key}/{field}`: companion hash rows
//! - `jobs/{id}`: job records owned by the host scheduler

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use slatedb::DbIterator;
use thiserror::Error;
use tracing::debug;

use crate::job::JobRecord;
use crate::keys::{
    TagKeyError, end_bound, hash_field_key, hash_prefix, job_info_key, parse_hash_field_key,
    parse_set_row_key, set_row_key, sets_prefix,
};
use crate::settings::StoreConfig;
use crate::storage::resolve_object_store;

#[derive(Debug, Error)]
pub enum TagStoreError {
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
    #[error(transparent)]
    Slate(#[from] slatedb::Error),
    #[error("json serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Key(#[from] TagKeyError),
    #[error("the transaction does not belong to this storage backend")]
    IncompatibleTransaction,
    #[error("the storage handle does not belong to this storage backend")]
    IncompatibleStorage,
}

/// Get current epoch time in milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Persisted form of one set entry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRow {
    pub value: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub expire_at_ms: Option<i64>,
}

/// Persisted form of one companion-hash field row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashRow {
    pub value: String,
    #[serde(default)]
    pub expire_at_ms: Option<i64>,
}

/// Read-side view of a set entry: the logical entry key plus the row record.
#[derive(Debug, Clone, PartialEq)]
pub struct SetEntry {
    pub key: String,
    pub value: String,
    pub score: Option<f64>,
    pub expire_at_ms: Option<i64>,
}

impl SetEntry {
    fn from_row(entry_key: &str, row: SetRow) -> Self {
        Self {
            key: entry_key.to_string(),
            value: row.value,
            score: row.score,
            expire_at_ms: row.expire_at_ms,
        }
    }
}

/// A tag store instance. Owns the SlateDB handle.
pub struct TagStore {
    name: String,
    pub(crate) db: Arc<slatedb::Db>,
}

impl std::fmt::Debug for TagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagStore").field("name", &self.name).finish()
    }
}

impl TagStore {
    /// Open a store against the configured backend.
    pub async fn open(cfg: &StoreConfig) -> Result<Arc<Self>, TagStoreError> {
        let resolved = resolve_object_store(&cfg.backend, &cfg.path)?;

        let mut db_builder =
            slatedb::DbBuilder::new(resolved.canonical_path.as_str(), resolved.store);

        // Apply custom flush interval if specified
        if let Some(flush_ms) = cfg.flush_interval_ms {
            let settings = slatedb::config::Settings {
                flush_interval: Some(std::time::Duration::from_millis(flush_ms)),
                ..Default::default()
            };
            db_builder = db_builder.with_settings(settings);
        }

        let db = db_builder.build().await?;
        Ok(Arc::new(Self {
            name: cfg.name.clone(),
            db: Arc::new(db),
        }))
    }

    /// Close the underlying database gracefully.
    pub async fn close(&self) -> Result<(), TagStoreError> {
        self.db.close().await?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write a job record at its standard key. Job records are owned by the
    /// host scheduler; the tag layer itself only reads them.
    pub async fn put_job(&self, job: &JobRecord) -> Result<(), TagStoreError> {
        let value = serde_json::to_vec(job)?;
        self.db.put(job_info_key(&job.id).as_bytes(), &value).await?;
        Ok(())
    }

    /// Read a job record by id. Records that fail to decode read as absent so
    /// a listing over mixed-version data keeps rendering.
    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, TagStoreError> {
        let Some(raw) = self.db.get(job_info_key(id).as_bytes()).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(job) => Ok(Some(job)),
            Err(error) => {
                debug!(job_id = %id, %error, "skipping undecodable job record");
                Ok(None)
            }
        }
    }

    /// Scan every set entry whose logical entry key starts with the prefix,
    /// in key order. Rows that fail to decode are skipped.
    pub async fn scan_set_entries(
        &self,
        entry_key_prefix: &str,
    ) -> Result<Vec<SetEntry>, TagStoreError> {
        let start = sets_prefix(entry_key_prefix);
        let end = end_bound(&start);
        let mut iter: DbIterator = self
            .db
            .scan::<Vec<u8>, _>(start.into_bytes()..end.into_bytes())
            .await?;
        let mut out = Vec::new();

        while let Some(kv) = iter.next().await? {
            let Ok(key) = std::str::from_utf8(&kv.key) else {
                continue;
            };
            let Some(entry_key) = parse_set_row_key(key) else {
                continue;
            };
            match serde_json::from_slice::<SetRow>(&kv.value) {
                Ok(row) => out.push(SetEntry::from_row(entry_key, row)),
                Err(error) => {
                    debug!(key, %error, "skipping undecodable set row");
                }
            }
        }

        Ok(out)
    }

    /// Look up one set entry by its exact logical entry key.
    pub async fn get_set_entry(&self, entry_key: &str) -> Result<Option<SetEntry>, TagStoreError> {
        let Some(raw) = self.db.get(set_row_key(entry_key).as_bytes()).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<SetRow>(&raw) {
            Ok(row) => Ok(Some(SetEntry::from_row(entry_key, row))),
            Err(error) => {
                debug!(entry_key, %error, "skipping undecodable set row");
                Ok(None)
            }
        }
    }

    /// Scan every field of one companion hash, in field order.
    pub async fn scan_hash_fields(
        &self,
        hash_key: &str,
    ) -> Result<Vec<(String, HashRow)>, TagStoreError> {
        let start = hash_prefix(hash_key);
        let end = end_bound(&start);
        let mut iter: DbIterator = self
            .db
            .scan::<Vec<u8>, _>(start.into_bytes()..end.into_bytes())
            .await?;
        let mut out = Vec::new();

        while let Some(kv) = iter.next().await? {
            let Ok(key) = std::str::from_utf8(&kv.key) else {
                continue;
            };
            let Some((_, field)) = parse_hash_field_key(key) else {
                continue;
            };
            match serde_json::from_slice::<HashRow>(&kv.value) {
                Ok(row) => out.push((field.to_string(), row)),
                Err(error) => {
                    debug!(key, %error, "skipping undecodable hash row");
                }
            }
        }

        Ok(out)
    }

    /// Look up one companion-hash field.
    pub async fn get_hash_field(
        &self,
        hash_key: &str,
        field: &str,
    ) -> Result<Option<HashRow>, TagStoreError> {
        let Some(raw) = self.db.get(hash_field_key(hash_key, field).as_bytes()).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<HashRow>(&raw) {
            Ok(row) => Ok(Some(row)),
            Err(error) => {
                debug!(hash_key, field, %error, "skipping undecodable hash row");
                Ok(None)
            }
        }
    }
}
