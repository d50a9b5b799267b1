use thiserror::Error;

/// Errors raised by the store, its engines and the JSON codec.
///
/// `NotFound` is the only variant callers are expected to recover from
/// (see [`crate::store::get_json_default`]). Everything else aborts the
/// surrounding transaction when propagated with `?`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("decode value at {key:?}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode value for {key:?}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage engine: {0}")]
    Engine(#[from] redb::Error),

    #[error("apply migration {id} ({name}): {reason:#}")]
    Migration {
        id: String,
        name: String,
        reason: anyhow::Error,
    },

    #[error("backup stream: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors raised by the task queue (registration, binding, bookkeeping).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task handler for {0:?} already registered")]
    AlreadyRegistered(String),

    #[error("registry is already bound to another queue")]
    RegistryBound,

    #[error("registry is bound to a queue; cannot register {0:?}")]
    RegistryFrozen(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
