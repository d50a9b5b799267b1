//! Consumer loop.
//!
//! One iteration takes tasks in transactions under the configured
//! [`DrainPolicy`], then waits for the poll delay, a wake signal, or
//! shutdown, whichever comes first. The handler list is visited from a
//! rotating start so a busy name cannot starve the others.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::handler::DynHandler;
use super::registry::{Notifier, Registry};
use super::state::Processed;
use crate::error::{QueueError, StoreError};
use crate::shutdown::Shutdown;
use crate::store::Store;

/// How much work one loop iteration does before waiting again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// One transaction, at most one task in total.
    #[default]
    OneTask,

    /// One transaction per registered name, at most one task per name.
    OnePerName,
}

pub struct Queue {
    store: Store,
    handlers: Vec<Box<dyn DynHandler>>,
    // keeps the wake channel open for the lifetime of the loop
    _notifier: Notifier,
    wake_rx: mpsc::Receiver<()>,
    drain: DrainPolicy,
    cursor: usize,
}

impl Queue {
    /// Take ownership of every handler in `registry`. A registry can be
    /// bound once; registration is closed afterwards.
    pub fn new(registry: &mut Registry, store: Store) -> Result<Self, QueueError> {
        let bound = registry.bind()?;
        Ok(Self {
            store,
            handlers: bound.handlers,
            _notifier: bound.notifier,
            wake_rx: bound.wake_rx,
            drain: DrainPolicy::default(),
            cursor: 0,
        })
    }

    pub fn with_drain_policy(mut self, drain: DrainPolicy) -> Self {
        self.drain = drain;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run one iteration of the loop without waiting.
    ///
    /// A store error aborts the transaction it happened in; tasks already
    /// committed by earlier transactions of this iteration stay committed.
    pub async fn poll_once(&mut self, shutdown: &Shutdown) -> Result<Vec<Processed>, StoreError> {
        let n = self.handlers.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let start = self.cursor % n;
        self.cursor = (start + 1) % n;

        let mut processed = Vec::new();
        match self.drain {
            DrainPolicy::OneTask => {
                let mut tx = self.store.begin().await;
                let mut served = None;
                for i in 0..n {
                    let idx = (start + i) % n;
                    if let Some(done) = self.handlers[idx].process_one(shutdown, &mut tx).await? {
                        processed.push(done);
                        served = Some(idx);
                        break;
                    }
                }
                tx.commit()?;
                // next iteration starts after whoever was served
                if let Some(idx) = served {
                    self.cursor = (idx + 1) % n;
                }
            }
            DrainPolicy::OnePerName => {
                for i in 0..n {
                    let handler = &self.handlers[(start + i) % n];
                    let mut tx = self.store.begin().await;
                    if let Some(done) = handler.process_one(shutdown, &mut tx).await? {
                        processed.push(done);
                    }
                    tx.commit()?;
                }
            }
        }
        Ok(processed)
    }

    /// Consume tasks until `shutdown` fires. A handler already running is
    /// allowed to finish; the loop exits at its next wait.
    pub async fn start_handlers(&mut self, shutdown: Shutdown, poll_delay: Duration) {
        info!(
            handlers = ?self.names(),
            ?poll_delay,
            drain = ?self.drain,
            "starting task handlers"
        );

        while !shutdown.is_shutdown() {
            match self.poll_once(&shutdown).await {
                Ok(processed) if !processed.is_empty() => {
                    debug!(count = processed.len(), "consumed tasks");
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "err consume task"),
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_delay) => {}
                _ = self.wake_rx.recv() => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("task handlers stopped");
    }
}
