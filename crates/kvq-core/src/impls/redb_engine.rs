//! Durable engine on top of `redb`.
//!
//! All values live in a single `&[u8] -> &[u8]` table. Each [`Engine::apply`]
//! is one redb write transaction, committed with redb's default (immediate)
//! durability, so a batch is either fully on disk or not at all.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::info;

use crate::error::StoreError;
use crate::ports::{Engine, Entry, WriteBatch};

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kvq");

pub struct RedbEngine {
    db: Database,
}

fn engine_err<E: Into<redb::Error>>(err: E) -> StoreError {
    StoreError::Engine(err.into())
}

impl RedbEngine {
    /// Open (or create) the database file at `path`.
    ///
    /// Missing parent directories are created. redb holds an exclusive file
    /// lock, so a second process opening the same file fails here.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)?,
            _ => {}
        }

        let db = Database::create(path).map_err(engine_err)?;

        // table を先に作っておく（read txn で TableDoesNotExist にならないように）
        let write = db.begin_write().map_err(engine_err)?;
        write.open_table(TABLE).map_err(engine_err)?;
        write.commit().map_err(engine_err)?;

        info!(path = %path.display(), "opened redb store");
        Ok(Self { db })
    }
}

impl Engine for RedbEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let read = self.db.begin_read().map_err(engine_err)?;
        let table = read.open_table(TABLE).map_err(engine_err)?;
        let value = table.get(key).map_err(engine_err)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<(), StoreError> {
        let write = self.db.begin_write().map_err(engine_err)?;
        {
            let mut table = write.open_table(TABLE).map_err(engine_err)?;
            for (key, value) in &batch {
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(engine_err)?;
            }
        }
        write.commit().map_err(engine_err)?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<Entry>, StoreError> {
        let read = self.db.begin_read().map_err(engine_err)?;
        let table = read.open_table(TABLE).map_err(engine_err)?;

        let mut entries = Vec::new();
        for entry in table.iter().map_err(engine_err)? {
            let (key, value) = entry.map_err(engine_err)?;
            entries.push((key.value().to_vec(), value.value().to_vec()));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.redb");

        {
            let mut engine = RedbEngine::open(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.insert(b"k1".to_vec(), b"\"v1\"".to_vec());
            batch.insert(b"k2".to_vec(), b"2".to_vec());
            engine.apply(batch).unwrap();
        }

        let engine = RedbEngine::open(&path).unwrap();
        assert_eq!(engine.get(b"k1").unwrap(), Some(b"\"v1\"".to_vec()));
        assert_eq!(engine.get(b"nope").unwrap(), None);
        assert_eq!(engine.scan().unwrap().len(), 2);
    }

    #[test]
    fn empty_database_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(&dir.path().join("empty.redb")).unwrap();
        assert!(engine.scan().unwrap().is_empty());
    }
}
