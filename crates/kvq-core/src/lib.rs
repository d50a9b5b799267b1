//! kvq-core
//!
//! Durable task queue on a transactional embedded key-value store.
//!
//! # モジュール構成
//! - **store**: single-writer transactions, JSON helpers, migrations, dump / restore
//! - **ports**: storage engine seam (`Engine`)
//! - **impls**: engines (`InMemoryEngine`, `RedbEngine`)
//! - **queue**: registry, typed task handles, consumer loop with DLX
//! - **retry**: bounded retry with pluggable backoff
//! - **shutdown**: cancellation signal shared by loops and handlers
//! - **config** / **observability**: TOML configuration, tracing setup, counts
//! - **error**: error taxonomy

pub mod config;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod retry;
pub mod shutdown;
pub mod store;

pub use config::Config;
pub use error::{QueueError, StoreError};
pub use queue::{Handler, Queue, Registry, TaskHandle};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use store::{Store, Txn};
