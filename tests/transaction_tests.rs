
use std::any::Any;
use std::time::Duration;

use test_helpers::*;

use tagstore::keys::{tag_entry_key, tag_set_key};
use tagstore::store::TagStoreError;
use tagstore::transaction::{StoreTransaction, TagsTransaction, WriteTransaction};

/// A write transaction from some other storage backend.
struct ForeignTransaction;

impl WriteTransaction for ForeignTransaction {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn test_adapter_rejects_foreign_transactions() {
    let mut foreign = ForeignTransaction;
    let err = TagsTransaction::new(&mut foreign).err().expect("must fail");
    assert!(matches!(err, TagStoreError::IncompatibleTransaction));
}

#[test]
fn test_adapter_accepts_its_own_backend() {
    let mut txn = StoreTransaction::new();
    let mut tags = TagsTransaction::new(&mut txn).expect("compatible");
    tags.expire_set_value("tags:default:job1", "urgent", Duration::from_secs(60));
    drop(tags);
    // expire_set + expire_hash queued as a pair
    assert_eq!(txn.len(), 2);
}

#[tokio::test]
async fn test_adapter_only_appends_until_commit() {
    let (_tmp, store) = open_temp_store().await;
    tag_job(&store, &job_record("job1", "Enqueued"), &["urgent"]).await;
    let set_key = tag_set_key(SCOPE, "job1").unwrap();
    let entry_key = tag_entry_key(SCOPE, "job1", "urgent").unwrap();

    let mut txn = StoreTransaction::new();
    let mut tags = TagsTransaction::new(&mut txn).expect("compatible");
    tags.expire_set_value(&set_key, "urgent", Duration::from_secs(3600));

    // Nothing observable before the caller commits
    let entry = store.get_set_entry(&entry_key).await.expect("get").expect("entry");
    assert_eq!(entry.expire_at_ms, None);

    store.commit(txn).await.expect("commit");
    let entry = store.get_set_entry(&entry_key).await.expect("get").expect("entry");
    assert!(entry.expire_at_ms.is_some());
}

#[tokio::test]
async fn test_expire_set_value_stamps_set_and_hash_in_lockstep() {
    let (_tmp, store) = open_temp_store().await;
    tag_job(&store, &job_record("job1", "Enqueued"), &["urgent", "billing"]).await;
    let set_key = tag_set_key(SCOPE, "job1").unwrap();

    let before = tagstore::store::now_epoch_ms();
    let expire_in = Duration::from_secs(3600);
    let mut txn = StoreTransaction::new();
    let mut tags = TagsTransaction::new(&mut txn).expect("compatible");
    tags.expire_set_value(&set_key, "urgent", expire_in);
    drop(tags);
    store.commit(txn).await.expect("commit");
    let after = tagstore::store::now_epoch_ms();

    // Every member entry of the set carries the stamp
    for tag in ["urgent", "billing"] {
        let entry_key = tag_entry_key(SCOPE, "job1", tag).unwrap();
        let entry = store.get_set_entry(&entry_key).await.expect("get").expect("entry");
        let expire_at = entry.expire_at_ms.expect("set entry expired");
        assert!(expire_at >= before + expire_in.as_millis() as i64);
        assert!(expire_at <= after + expire_in.as_millis() as i64);
    }

    // ...and so does the companion hash
    let fields = store.scan_hash_fields(&set_key).await.expect("hash");
    assert!(!fields.is_empty());
    for (field, row) in fields {
        let expire_at = row.expire_at_ms.unwrap_or_else(|| panic!("field {field} not expired"));
        assert!(expire_at >= before + expire_in.as_millis() as i64);
        assert!(expire_at <= after + expire_in.as_millis() as i64);
    }
}

#[tokio::test]
async fn test_persist_set_value_clears_both_sides() {
    let (_tmp, store) = open_temp_store().await;
    tag_job(&store, &job_record("job1", "Enqueued"), &["urgent"]).await;
    let set_key = tag_set_key(SCOPE, "job1").unwrap();
    let entry_key = tag_entry_key(SCOPE, "job1", "urgent").unwrap();

    let mut txn = StoreTransaction::new();
    let mut tags = TagsTransaction::new(&mut txn).expect("compatible");
    tags.expire_set_value(&set_key, "urgent", Duration::from_secs(3600));
    drop(tags);
    store.commit(txn).await.expect("commit");

    let mut txn = StoreTransaction::new();
    let mut tags = TagsTransaction::new(&mut txn).expect("compatible");
    tags.persist_set_value(&set_key, "urgent");
    drop(tags);
    store.commit(txn).await.expect("commit");

    let entry = store.get_set_entry(&entry_key).await.expect("get").expect("entry");
    assert_eq!(entry.expire_at_ms, None);
    for (_, row) in store.scan_hash_fields(&set_key).await.expect("hash") {
        assert_eq!(row.expire_at_ms, None);
    }
}

#[tokio::test]
async fn test_expire_covers_rows_queued_in_the_same_batch() {
    let (_tmp, store) = open_temp_store().await;
    store
        .put_job(&job_record("job1", "Enqueued"))
        .await
        .expect("put job");
    let set_key = tag_set_key(SCOPE, "job1").unwrap();

    // Tagging and expiring assembled into one atomic batch
    let mut txn = StoreTransaction::new();
    txn.add_to_set(&set_key, "urgent", None);
    txn.set_hash_fields(&set_key, [("created".to_string(), "now".to_string())]);
    let mut tags = TagsTransaction::new(&mut txn).expect("compatible");
    tags.expire_set_value(&set_key, "urgent", Duration::from_secs(60));
    drop(tags);
    store.commit(txn).await.expect("commit");

    let entry_key = tag_entry_key(SCOPE, "job1", "urgent").unwrap();
    let entry = store.get_set_entry(&entry_key).await.expect("get").expect("entry");
    assert!(entry.expire_at_ms.is_some());
    let (_, row) = &store.scan_hash_fields(&set_key).await.expect("hash")[0];
    assert!(row.expire_at_ms.is_some());
}

#[tokio::test]
async fn test_remove_operations_delete_rows() {
    let (_tmp, store) = open_temp_store().await;
    tag_job(&store, &job_record("job1", "Enqueued"), &["urgent", "billing"]).await;
    let set_key = tag_set_key(SCOPE, "job1").unwrap();

    let mut txn = StoreTransaction::new();
    txn.remove_from_set(&set_key, "urgent");
    txn.remove_hash(&set_key);
    store.commit(txn).await.expect("commit");

    let gone = tag_entry_key(SCOPE, "job1", "urgent").unwrap();
    assert!(store.get_set_entry(&gone).await.expect("get").is_none());
    let kept = tag_entry_key(SCOPE, "job1", "billing").unwrap();
    assert!(store.get_set_entry(&kept).await.expect("get").is_some());
    assert!(store.scan_hash_fields(&set_key).await.expect("hash").is_empty());

    assert_eq!(store.job_count(&["urgent"], "").await.expect("count"), 0);
    assert_eq!(store.job_count(&["billing"], "").await.expect("count"), 1);
}

#[tokio::test]
async fn test_set_scores_survive_expire() {
    let (_tmp, store) = open_temp_store().await;
    let set_key = tag_set_key(SCOPE, "job1").unwrap();

    let mut txn = StoreTransaction::new();
    txn.add_to_set(&set_key, "urgent", Some(42.0));
    store.commit(txn).await.expect("commit");

    let mut txn = StoreTransaction::new();
    txn.expire_set(&set_key, Duration::from_secs(60));
    store.commit(txn).await.expect("commit");

    let entry_key = tag_entry_key(SCOPE, "job1", "urgent").unwrap();
    let entry = store.get_set_entry(&entry_key).await.expect("get").expect("entry");
    assert_eq!(entry.score, Some(42.0));
    assert!(entry.expire_at_ms.is_some());
}
