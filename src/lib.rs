//! Tag secondary index for SlateDB-backed job stores.
//!
//! The backing store is a flat, ordered keyspace with no secondary indexes.
//! Tag-to-job associations are encoded into synthetic composite entry keys
//! (`keys`), searched with prefix scans plus explicit key parsing (`query`),
//! and kept consistent with their companion metadata through a paired write
//! path (`transaction`). Job payloads deserialize tolerantly (`payload`):
//! a listing renders every row even when a stored payload no longer
//! resolves.

pub mod job;
pub mod keys;
pub mod payload;
mod query;
pub mod service;
pub mod settings;
pub mod storage;
pub mod store;
pub mod transaction;
