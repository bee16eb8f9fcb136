//! Write path: the host transaction, the tags adapter over it, and commit.
//!
//! A `StoreTransaction` is an ordered queue of logical operations assembled
//! by the caller; nothing touches the database until `TagStore::commit`
//! materializes the queue into a single atomic `WriteBatch`. The
//! `TagsTransaction` adapter appends paired operations (set + companion
//! hash) into the caller's queue so both collections representing a tag
//! association change in lockstep.

use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

use slatedb::WriteBatch;
use tracing::debug;

use crate::keys::{
    end_bound, hash_field_key, hash_prefix, set_member_entry_key, set_member_prefix, set_row_key,
};
use crate::store::{HashRow, SetRow, TagStore, TagStoreError, now_epoch_ms};

/// Host-boundary trait for a backend write transaction. Adapters use
/// `as_any_mut` to verify the transaction belongs to their own backend.
pub trait WriteTransaction: Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Clone)]
pub(crate) enum StoreOp {
    AddToSet {
        key: String,
        value: String,
        score: Option<f64>,
    },
    RemoveFromSet {
        key: String,
        value: String,
    },
    SetHashFields {
        key: String,
        fields: Vec<(String, String)>,
    },
    RemoveHash {
        key: String,
    },
    ExpireSet {
        key: String,
        expire_in: Duration,
    },
    PersistSet {
        key: String,
    },
    ExpireHash {
        key: String,
        expire_in: Duration,
    },
    PersistHash {
        key: String,
    },
}

/// This backend's write transaction: an ordered operation queue. The queue
/// holder decides when to commit; appending never touches the store.
#[derive(Debug, Default)]
pub struct StoreTransaction {
    pub(crate) ops: Vec<StoreOp>,
}

impl StoreTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_set(&mut self, key: &str, value: &str, score: Option<f64>) {
        self.ops.push(StoreOp::AddToSet {
            key: key.to_string(),
            value: value.to_string(),
            score,
        });
    }

    pub fn remove_from_set(&mut self, key: &str, value: &str) {
        self.ops.push(StoreOp::RemoveFromSet {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn set_hash_fields(
        &mut self,
        key: &str,
        fields: impl IntoIterator<Item = (String, String)>,
    ) {
        self.ops.push(StoreOp::SetHashFields {
            key: key.to_string(),
            fields: fields.into_iter().collect(),
        });
    }

    pub fn remove_hash(&mut self, key: &str) {
        self.ops.push(StoreOp::RemoveHash {
            key: key.to_string(),
        });
    }

    pub fn expire_set(&mut self, key: &str, expire_in: Duration) {
        self.ops.push(StoreOp::ExpireSet {
            key: key.to_string(),
            expire_in,
        });
    }

    pub fn persist_set(&mut self, key: &str) {
        self.ops.push(StoreOp::PersistSet {
            key: key.to_string(),
        });
    }

    pub fn expire_hash(&mut self, key: &str, expire_in: Duration) {
        self.ops.push(StoreOp::ExpireHash {
            key: key.to_string(),
            expire_in,
        });
    }

    pub fn persist_hash(&mut self, key: &str) {
        self.ops.push(StoreOp::PersistHash {
            key: key.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl WriteTransaction for StoreTransaction {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Adapter that propagates expiration and persistence from a tagged set
/// entry to its companion hash, inside the caller's own operation queue.
pub struct TagsTransaction<'a> {
    txn: &'a mut StoreTransaction,
}

impl<'a> TagsTransaction<'a> {
    /// Wrap a host transaction. Fails when the transaction does not belong
    /// to this storage backend; the adapter is not generic across backends.
    pub fn new(transaction: &'a mut dyn WriteTransaction) -> Result<Self, TagStoreError> {
        let txn = transaction
            .as_any_mut()
            .downcast_mut::<StoreTransaction>()
            .ok_or(TagStoreError::IncompatibleTransaction)?;
        Ok(Self { txn })
    }

    /// Expire the tag association under `key`: every set entry and every
    /// companion hash field, in the same batch.
    pub fn expire_set_value(&mut self, key: &str, _value: &str, expire_in: Duration) {
        self.txn.expire_set(key, expire_in);
        self.txn.expire_hash(key, expire_in);
    }

    /// Clear expiration from the tag association under `key`, set and
    /// companion hash alike.
    pub fn persist_set_value(&mut self, key: &str, _value: &str) {
        self.txn.persist_set(key);
        self.txn.persist_hash(key);
    }
}

impl TagStore {
    /// Apply a transaction's queued operations, in order, as one atomic
    /// write batch.
    ///
    /// Expire and persist operations rewrite every row currently stored for
    /// the set (or hash) as well as rows queued earlier in the same
    /// transaction, so a reader never observes half of an association
    /// expired.
    pub async fn commit(&self, txn: StoreTransaction) -> Result<(), TagStoreError> {
        // Physical writes accumulated across ops: Some(bytes) puts, None deletes.
        let mut pending: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();

        for op in txn.ops {
            match op {
                StoreOp::AddToSet { key, value, score } => {
                    let row = SetRow {
                        value: value.clone(),
                        score,
                        expire_at_ms: None,
                    };
                    pending.insert(
                        set_row_key(&set_member_entry_key(&key, &value)),
                        Some(serde_json::to_vec(&row)?),
                    );
                }
                StoreOp::RemoveFromSet { key, value } => {
                    pending.insert(set_row_key(&set_member_entry_key(&key, &value)), None);
                }
                StoreOp::SetHashFields { key, fields } => {
                    for (field, value) in fields {
                        let row = HashRow {
                            value,
                            expire_at_ms: None,
                        };
                        pending.insert(hash_field_key(&key, &field), Some(serde_json::to_vec(&row)?));
                    }
                }
                StoreOp::RemoveHash { key } => {
                    for (field, _) in self.scan_hash_fields(&key).await? {
                        pending.insert(hash_field_key(&key, &field), None);
                    }
                    let prefix = hash_prefix(&key);
                    let queued: Vec<String> = pending
                        .range(prefix.clone()..end_bound(&prefix))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for k in queued {
                        pending.insert(k, None);
                    }
                }
                StoreOp::ExpireSet { key, expire_in } => {
                    let expire_at = now_epoch_ms() + expire_in.as_millis() as i64;
                    self.restamp_set_rows(&mut pending, &key, Some(expire_at))
                        .await?;
                }
                StoreOp::PersistSet { key } => {
                    self.restamp_set_rows(&mut pending, &key, None).await?;
                }
                StoreOp::ExpireHash { key, expire_in } => {
                    let expire_at = now_epoch_ms() + expire_in.as_millis() as i64;
                    self.restamp_hash_rows(&mut pending, &key, Some(expire_at))
                        .await?;
                }
                StoreOp::PersistHash { key } => {
                    self.restamp_hash_rows(&mut pending, &key, None).await?;
                }
            }
        }

        let rows = pending.len();
        let mut batch = WriteBatch::new();
        for (key, value) in pending {
            match value {
                Some(value) => batch.put(key.as_bytes(), &value),
                None => batch.delete(key.as_bytes()),
            }
        }
        self.db.write(batch).await?;
        debug!(store = %self.name(), rows, "committed write batch");
        Ok(())
    }

    /// Stamp `expire_at_ms` onto every entry row of one set: rows already
    /// stored, plus rows queued earlier in the pending overlay.
    async fn restamp_set_rows(
        &self,
        pending: &mut BTreeMap<String, Option<Vec<u8>>>,
        set_key: &str,
        expire_at_ms: Option<i64>,
    ) -> Result<(), TagStoreError> {
        for entry in self.scan_set_entries(&set_member_prefix(set_key)).await? {
            let physical = set_row_key(&entry.key);
            if !pending.contains_key(&physical) {
                let row = SetRow {
                    value: entry.value,
                    score: entry.score,
                    expire_at_ms,
                };
                pending.insert(physical, Some(serde_json::to_vec(&row)?));
            }
        }

        let prefix = set_row_key(&set_member_prefix(set_key));
        let queued: Vec<(String, Vec<u8>)> = pending
            .range(prefix.clone()..end_bound(&prefix))
            .filter_map(|(k, v)| v.as_ref().map(|bytes| (k.clone(), bytes.clone())))
            .collect();
        for (physical, bytes) in queued {
            if let Ok(mut row) = serde_json::from_slice::<SetRow>(&bytes) {
                row.expire_at_ms = expire_at_ms;
                pending.insert(physical, Some(serde_json::to_vec(&row)?));
            }
        }
        Ok(())
    }

    /// Hash-side counterpart of `restamp_set_rows`.
    async fn restamp_hash_rows(
        &self,
        pending: &mut BTreeMap<String, Option<Vec<u8>>>,
        hash_key: &str,
        expire_at_ms: Option<i64>,
    ) -> Result<(), TagStoreError> {
        for (field, row) in self.scan_hash_fields(hash_key).await? {
            let physical = hash_field_key(hash_key, &field);
            if !pending.contains_key(&physical) {
                let row = HashRow {
                    value: row.value,
                    expire_at_ms,
                };
                pending.insert(physical, Some(serde_json::to_vec(&row)?));
            }
        }

        let prefix = hash_prefix(hash_key);
        let queued: Vec<(String, Vec<u8>)> = pending
            .range(prefix.clone()..end_bound(&prefix))
            .filter_map(|(k, v)| v.as_ref().map(|bytes| (k.clone(), bytes.clone())))
            .collect();
        for (physical, bytes) in queued {
            if let Ok(mut row) = serde_json::from_slice::<HashRow>(&bytes) {
                row.expire_at_ms = expire_at_ms;
                pending.insert(physical, Some(serde_json::to_vec(&row)?));
            }
        }
        Ok(())
    }
}
