//! Registry - Handler の登録と TaskHandle の発行
//!
//! - `register` は名前ごとに 1 回だけ
//! - Queue に bind された後は登録不可
//! - 登録順は保持される (consumer loop の巡回順になる)

use std::marker::PhantomData;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use super::handler::{DynHandler, Handler, TypedHandler};
use super::keys::queue_key;
use super::record::{TaskArgs, TaskRecord};
use crate::error::QueueError;
use crate::store::{Txn, get_json_default, set_json};

/// Capacity of the wake channel unless configured otherwise.
pub const DEFAULT_WAKE_CAPACITY: usize = 25;

/// Non-blocking, lossy wake signal posted after a schedule commits.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: mpsc::Sender<()>,
}

impl Notifier {
    pub(crate) fn notify(&self, name: &str) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            // the consumer polls anyway
            Err(TrySendError::Full(())) => debug!(task = name, "miss notifying task scheduling"),
            Err(TrySendError::Closed(())) => {}
        }
    }
}

/// Handlers waiting to be bound to a [`Queue`](super::Queue).
///
/// # 使用例
/// ```ignore
/// let mut registry = Registry::new();
/// let post = registry.register("boardwhite:post", PostHandler)?;
/// let mut queue = Queue::new(&mut registry, store.clone())?;
///
/// let mut tx = store.begin().await;
/// post.schedule(&mut tx, 3, PostArgs { id: 7 })?;
/// tx.commit()?;
/// ```
pub struct Registry {
    handlers: Vec<Box<dyn DynHandler>>,
    notifier: Notifier,
    // None once bound
    wake_rx: Option<mpsc::Receiver<()>>,
}

pub(crate) struct Bound {
    pub(crate) handlers: Vec<Box<dyn DynHandler>>,
    pub(crate) notifier: Notifier,
    pub(crate) wake_rx: mpsc::Receiver<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_wake_capacity(DEFAULT_WAKE_CAPACITY)
    }

    pub fn with_wake_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            handlers: Vec::new(),
            notifier: Notifier { tx },
            wake_rx: Some(rx),
        }
    }

    /// Register `handler` under `name` and return the handle used to
    /// schedule tasks for it.
    pub fn register<T, H>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<TaskHandle<T>, QueueError>
    where
        T: TaskArgs,
        H: Handler<T> + 'static,
    {
        let name = name.into();
        if self.is_bound() {
            return Err(QueueError::RegistryFrozen(name));
        }
        if self.handlers.iter().any(|h| h.name() == name) {
            return Err(QueueError::AlreadyRegistered(name));
        }

        self.handlers
            .push(Box::new(TypedHandler::<T, H>::new(name.clone(), handler)));
        info!(task = %name, "registered task handler");

        Ok(TaskHandle {
            name,
            notifier: self.notifier.clone(),
            _marker: PhantomData,
        })
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn is_bound(&self) -> bool {
        self.wake_rx.is_none()
    }

    pub(crate) fn bind(&mut self) -> Result<Bound, QueueError> {
        let wake_rx = self.wake_rx.take().ok_or(QueueError::RegistryBound)?;
        Ok(Bound {
            handlers: std::mem::take(&mut self.handlers),
            notifier: self.notifier.clone(),
            wake_rx,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed entry point for scheduling tasks of one registered name.
pub struct TaskHandle<T> {
    name: String,
    notifier: Notifier,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            notifier: self.notifier.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("name", &self.name).finish()
    }
}

impl<T: TaskArgs> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a task to the main list inside `tx`.
    ///
    /// The task becomes visible only when `tx` commits; the consumer is
    /// woken after that. `retries` is the number of re-executions allowed
    /// after the first failure.
    pub fn schedule(&self, tx: &mut Txn, retries: u32, args: T) -> Result<(), QueueError> {
        let key = queue_key(&self.name);
        let mut main: Vec<TaskRecord<T>> = get_json_default(tx, &key, Vec::new())?;
        main.push(TaskRecord::new(self.name.clone(), retries, args));
        set_json(tx, &key, &main)?;

        let notifier = self.notifier.clone();
        let name = self.name.clone();
        tx.on_commit(move || notifier.notify(&name));

        info!(task = %self.name, retries, queued = main.len(), "scheduled task");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::shutdown::Shutdown;
    use crate::store::{Store, get_json};

    struct Noop;

    #[async_trait]
    impl Handler<i64> for Noop {
        async fn handle(&self, _shutdown: &Shutdown, _tx: &mut Txn, _args: i64) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = Registry::new();
        registry.register::<i64, _>("t", Noop).unwrap();

        let err = registry.register::<i64, _>("t", Noop).unwrap_err();
        assert!(matches!(err, QueueError::AlreadyRegistered(ref name) if name == "t"));
        assert_eq!(registry.names(), vec!["t"]);
    }

    #[test]
    fn names_keep_registration_order() {
        let mut registry = Registry::new();
        registry.register::<i64, _>("b", Noop).unwrap();
        registry.register::<i64, _>("a", Noop).unwrap();
        registry.register::<i64, _>("c", Noop).unwrap();
        assert_eq!(registry.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn bind_is_one_shot_and_freezes_registration() {
        let mut registry = Registry::new();
        registry.register::<i64, _>("t", Noop).unwrap();

        let bound = registry.bind().unwrap();
        assert_eq!(bound.handlers.len(), 1);
        assert!(registry.is_bound());

        assert!(matches!(registry.bind(), Err(QueueError::RegistryBound)));
        assert!(matches!(
            registry.register::<i64, _>("late", Noop),
            Err(QueueError::RegistryFrozen(_))
        ));
    }

    #[tokio::test]
    async fn schedule_appends_with_ttl() {
        let store = Store::in_memory();
        let mut registry = Registry::new();
        let handle = registry.register::<i64, _>("t", Noop).unwrap();

        let mut tx = store.begin().await;
        handle.schedule(&mut tx, 1, 42).unwrap();
        handle.schedule(&mut tx, 0, 43).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().await;
        let main: Vec<TaskRecord<i64>> = get_json(&tx, "dbq:queue:t").unwrap();
        assert_eq!(
            main,
            vec![TaskRecord::new("t", 1, 42_i64), TaskRecord::new("t", 0, 43_i64)]
        );
    }

    #[tokio::test]
    async fn wake_is_posted_only_after_commit() {
        let store = Store::in_memory();
        let mut registry = Registry::new();
        let handle = registry.register::<i64, _>("t", Noop).unwrap();
        let mut bound = registry.bind().unwrap();

        let mut tx = store.begin().await;
        handle.schedule(&mut tx, 0, 1).unwrap();
        assert!(bound.wake_rx.try_recv().is_err());
        tx.rollback();
        assert!(bound.wake_rx.try_recv().is_err());

        let tx = store.begin().await;
        assert!(get_json::<Vec<TaskRecord<i64>>>(&tx, "dbq:queue:t").is_err());
        drop(tx);

        let mut tx = store.begin().await;
        handle.schedule(&mut tx, 0, 1).unwrap();
        tx.commit().unwrap();
        assert!(bound.wake_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn full_wake_channel_drops_signals() {
        let store = Store::in_memory();
        let mut registry = Registry::with_wake_capacity(2);
        let handle = registry.register::<i64, _>("t", Noop).unwrap();
        let mut bound = registry.bind().unwrap();

        for i in 0..5 {
            let mut tx = store.begin().await;
            handle.schedule(&mut tx, 0, i).unwrap();
            tx.commit().unwrap();
        }

        assert!(bound.wake_rx.try_recv().is_ok());
        assert!(bound.wake_rx.try_recv().is_ok());
        assert!(bound.wake_rx.try_recv().is_err());

        let tx = store.begin().await;
        let main: Vec<TaskRecord<i64>> = get_json(&tx, "dbq:queue:t").unwrap();
        assert_eq!(main.len(), 5);
    }
}
