//! In-memory engine (development / tests).

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::ports::{Engine, Entry, WriteBatch};

/// Volatile engine backed by a `BTreeMap`. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for InMemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        self.data.extend(batch);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<Entry>, StoreError> {
        Ok(self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
