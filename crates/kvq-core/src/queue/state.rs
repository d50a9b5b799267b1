//! Where a task came from and what happened to it.

use serde::{Deserialize, Serialize};

/// The two lists kept per task name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    /// `dbq:queue:{name}`: freshly scheduled tasks.
    Main,

    /// `dbq:queue:{name}:dlx`: tasks that failed and still have budget.
    DeadLetter,
}

/// Result of running one task.
///
/// State transitions:
/// - Main -> Succeeded
/// - Main -> DeadLettered -> ... -> Succeeded | Dropped
/// - Main -> Dropped (when `retries` was 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Handler returned `Ok`; the task is gone.
    Succeeded,

    /// Handler failed; the task was appended to the DLX with `ttl` left.
    DeadLettered { ttl: i64 },

    /// Handler failed with no budget left; the task is gone (logged only).
    Dropped,
}

impl TaskOutcome {
    /// Is the task gone from both lists?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskOutcome::Succeeded | TaskOutcome::Dropped)
    }
}

/// One task taken off a list by the consumer loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub name: String,
    pub source: ListKind,
    pub outcome: TaskOutcome,
}
