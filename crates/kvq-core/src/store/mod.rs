//! Store - トランザクション付き KV ストア
//!
//! Byte keys map to JSON documents. Every access goes through a [`Txn`],
//! and a `Txn` can only be obtained from [`Store::begin`], which hands out
//! the single write slot of the process.
//!
//! # Concurrency model
//! - One transaction at a time, process-wide. Reads take the same lock as
//!   writes; there is no key-range locking and no reader/writer split.
//! - Inside a transaction all reads see one consistent state (nobody else
//!   can commit while the slot is held) plus the transaction's own writes.
//! - Writes are buffered and applied as one atomic engine batch on
//!   [`Txn::commit`]. Dropping a `Txn` without committing discards them.
//!
//! Throughput is capped at one transaction at a time; in exchange there are
//! no deadlocks and no write skew.

mod backup;
mod json;
mod migrate;

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::impls::{InMemoryEngine, RedbEngine};
use crate::ports::{Engine, Entry, WriteBatch};

pub use self::backup::{dump_json, restore_json};
pub use self::json::{get_json, get_json_default, set_json};
pub use self::migrate::{AppliedMigration, AppliedMigrations, Migration, applied_migrations, migrate};

/// Path that selects the volatile in-memory engine instead of a file.
pub const IN_MEMORY: &str = ":memory:";

type CommitHook = Box<dyn FnOnce() + Send + Sync>;

/// Handle to the store. Cheap to clone; all clones share the same write slot.
#[derive(Clone)]
pub struct Store {
    engine: Arc<Mutex<Box<dyn Engine>>>,
}

impl Store {
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Box::new(engine))),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(InMemoryEngine::new())
    }

    /// Open a redb-backed store at `path`, or an in-memory one for `":memory:"`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path == Path::new(IN_MEMORY) {
            return Ok(Self::in_memory());
        }
        Ok(Self::new(RedbEngine::open(path)?))
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open(&config.path)
    }

    /// Wait for the write slot and open a transaction.
    ///
    /// The returned `Txn` owns the slot until it is committed or dropped.
    pub async fn begin(&self) -> Txn {
        let engine = Arc::clone(&self.engine).lock_owned().await;
        trace!("transaction started");
        Txn {
            engine,
            writes: WriteBatch::new(),
            hooks: Vec::new(),
        }
    }

    /// Run `f` inside one transaction.
    ///
    /// `Ok` commits every write made through the transaction; `Err` discards
    /// them all and is returned unchanged. A failed commit is converted into
    /// the caller's error type.
    ///
    /// ```ignore
    /// store
    ///     .run(|tx| Box::pin(async move {
    ///         let n: i64 = get_json_default(tx, "counter", 0)?;
    ///         set_json(tx, "counter", &(n + 1))?;
    ///         Ok::<_, StoreError>(())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn run<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Txn) -> BoxFuture<'t, Result<T, E>>,
        E: From<StoreError>,
    {
        let mut tx = self.begin().await;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }
}

/// An open transaction holding the store's single write slot.
pub struct Txn {
    engine: OwnedMutexGuard<Box<dyn Engine>>,
    writes: WriteBatch,
    hooks: Vec<CommitHook>,
}

impl Txn {
    /// Read `key`, seeing this transaction's own uncommitted writes.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        if let Some(value) = self.writes.get(key) {
            return Ok(value.clone());
        }
        self.engine
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(String::from_utf8_lossy(key).into_owned()))
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.writes.insert(key.to_vec(), value);
    }

    /// Every entry visible to this transaction, in key order.
    pub fn entries(&self) -> Result<Vec<Entry>, StoreError> {
        let mut merged: WriteBatch = self.engine.scan()?.into_iter().collect();
        merged.extend(self.writes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(merged.into_iter().collect())
    }

    /// Register `hook` to run after a successful commit, once the write slot
    /// has been released. Hooks of an aborted transaction never run.
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + Sync + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn commit(self) -> Result<(), StoreError> {
        let Txn {
            mut engine,
            writes,
            hooks,
        } = self;

        let count = writes.len();
        if count > 0 {
            engine.apply(writes)?;
        }
        drop(engine);
        trace!(writes = count, "transaction committed");

        for hook in hooks {
            hook();
        }
        Ok(())
    }

    /// Discard all buffered writes. Equivalent to dropping the transaction.
    pub fn rollback(self) {
        debug!(
            discarded = self.writes.len(),
            "transaction rolled back"
        );
    }
}
