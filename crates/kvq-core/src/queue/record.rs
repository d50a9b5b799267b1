//! Task record: the persisted shape of one queued task.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bounds every task argument type must meet.
///
/// - `Serialize` / `DeserializeOwned`: the record is stored as JSON
/// - `Clone`: the handler consumes a copy; the record itself may still
///   be moved to the DLX afterwards
/// - `Send + Sync + 'static`: records cross the handler's `await` points
pub trait TaskArgs: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> TaskArgs for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// `{name, ttl, args}` as stored in `dbq:queue:{name}` and its DLX.
///
/// Design:
/// - `ttl` is the remaining execution budget: `retries + 1` at schedule time,
///   decremented before every execution, never incremented.
/// - A record whose `ttl` drops below 1 after a failed run is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord<T> {
    pub name: String,
    pub ttl: i64,
    pub args: T,
}

impl<T> TaskRecord<T> {
    pub fn new(name: impl Into<String>, retries: u32, args: T) -> Self {
        Self {
            name: name.into(),
            ttl: i64::from(retries) + 1,
            args,
        }
    }

    /// Spend one unit of budget for the attempt about to run.
    /// Returns the remaining ttl.
    pub fn start_attempt(&mut self) -> i64 {
        self.ttl -= 1;
        self.ttl
    }

    pub fn is_exhausted(&self) -> bool {
        self.ttl < 1
    }
}
