//! Durable task queue on top of [`Store`](crate::store::Store).
//!
//! Per task name two JSON lists are kept: the main FIFO list
//! (`dbq:queue:{name}`) and the dead-letter list (`dbq:queue:{name}:dlx`).
//! Scheduling appends inside the caller's transaction; the consumer loop
//! in [`Queue`] takes one task at a time in its own transaction and runs
//! the handler there.

mod handler;
mod keys;
mod record;
mod registry;
mod state;
mod worker;

pub use handler::Handler;
pub use keys::{DLX_SUFFIX, QUEUE_KEY_PREFIX, dlx_key, queue_key};
pub use record::{TaskArgs, TaskRecord};
pub use registry::{DEFAULT_WAKE_CAPACITY, Registry, TaskHandle};
pub use state::{ListKind, Processed, TaskOutcome};
pub use worker::{DrainPolicy, Queue};

use crate::error::StoreError;
use crate::observability::QueueCounts;
use crate::store::{Txn, get_json_default};

/// Lengths of both lists for `name`, without decoding task arguments.
pub fn counts(tx: &Txn, name: &str) -> Result<QueueCounts, StoreError> {
    let main: Vec<serde_json::Value> = get_json_default(tx, &queue_key(name), Vec::new())?;
    let dead: Vec<serde_json::Value> = get_json_default(tx, &dlx_key(name), Vec::new())?;
    Ok(QueueCounts {
        queued: main.len(),
        dead_lettered: dead.len(),
    })
}
