//! Engine port - 永続化エンジンの抽象化
//!
//! An engine only has to expose committed state and apply a write batch
//! atomically. Transactions, locking and snapshots live in
//! [`crate::store`], so any engine meeting this contract (redb, an
//! in-memory map, ...) can back the queue and migrations unchanged.

use std::collections::BTreeMap;

use crate::error::StoreError;

/// A buffered set of writes, keyed and ordered by raw key bytes.
pub type WriteBatch = BTreeMap<Vec<u8>, Vec<u8>>;

/// One stored key/value pair.
pub type Entry = (Vec<u8>, Vec<u8>);

pub trait Engine: Send + Sync {
    /// Read a committed value. `Ok(None)` means the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Apply every write in `batch`, all or nothing.
    fn apply(&mut self, batch: WriteBatch) -> Result<(), StoreError>;

    /// All committed entries in key order.
    fn scan(&self) -> Result<Vec<Entry>, StoreError>;
}
