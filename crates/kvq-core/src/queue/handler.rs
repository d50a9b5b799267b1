//! Handler trait - タスクを実行する Handler の定義
//!
//! - ジェネリック trait (`Handler<T>`): 利用者が実装する
//! - Object-safe trait (`DynHandler`): Registry が保持する
//! - Type erasure (`TypedHandler<T, H>` → `DynHandler`)

use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::keys::{dlx_key, queue_key};
use super::record::{TaskArgs, TaskRecord};
use super::state::{ListKind, Processed, TaskOutcome};
use crate::error::StoreError;
use crate::shutdown::Shutdown;
use crate::store::{Txn, get_json_default, set_json};

/// Executes tasks of one name.
///
/// The handler runs inside the transaction that dequeued the task and gets
/// that transaction as `tx`: anything it writes commits together with the
/// dequeue bookkeeping. This includes writes made before returning `Err`.
/// While it runs, every other transaction in the process waits.
///
/// Every `Err` is treated as retryable.
///
/// # 使用例
/// ```ignore
/// struct PostSnippet;
///
/// #[async_trait]
/// impl Handler<SnippetArgs> for PostSnippet {
///     async fn handle(&self, _shutdown: &Shutdown, tx: &mut Txn, args: SnippetArgs) -> anyhow::Result<()> {
///         set_json(tx, "snippets:last", &args.id)?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: TaskArgs>: Send + Sync {
    async fn handle(&self, shutdown: &Shutdown, tx: &mut Txn, args: T) -> anyhow::Result<()>;
}

/// Object-safe view of a registered handler, so handlers of different
/// argument types can share one list.
#[async_trait]
pub(crate) trait DynHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Take at most one task for this name (main list first, then DLX) and
    /// run it. `Ok(None)` means both lists were empty.
    ///
    /// Only store errors are returned; handler failures become outcomes.
    async fn process_one(
        &self,
        shutdown: &Shutdown,
        tx: &mut Txn,
    ) -> Result<Option<Processed>, StoreError>;
}

pub(crate) struct TypedHandler<T: TaskArgs, H: Handler<T>> {
    name: String,
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: TaskArgs, H: Handler<T>> TypedHandler<T, H> {
    pub(crate) fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TaskArgs, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_one(
        &self,
        shutdown: &Shutdown,
        tx: &mut Txn,
    ) -> Result<Option<Processed>, StoreError> {
        let key = queue_key(&self.name);
        let dlx = dlx_key(&self.name);

        let mut main: Vec<TaskRecord<T>> = get_json_default(tx, &key, Vec::new())?;
        let mut dead: Vec<TaskRecord<T>> = get_json_default(tx, &dlx, Vec::new())?;

        // main を DLX より優先
        let (mut task, source) = if !main.is_empty() {
            let task = main.remove(0);
            set_json(tx, &key, &main)?;
            (task, ListKind::Main)
        } else if !dead.is_empty() {
            let task = dead.remove(0);
            set_json(tx, &dlx, &dead)?;
            (task, ListKind::DeadLetter)
        } else {
            return Ok(None);
        };

        info!(task = %self.name, ttl = task.ttl, ?source, "fetched task to execute");
        let ttl = task.start_attempt();

        let outcome = match self.handler.handle(shutdown, tx, task.args.clone()).await {
            Ok(()) => {
                info!(task = %self.name, ?source, "finished executing task");
                TaskOutcome::Succeeded
            }
            Err(err) if task.is_exhausted() => {
                error!(
                    task = %self.name,
                    key = %key,
                    error = %format_args!("{err:#}"),
                    "err executing task, ttl is zero, stopping retrying"
                );
                TaskOutcome::Dropped
            }
            Err(err) => {
                warn!(
                    task = %self.name,
                    key = %key,
                    ttl,
                    error = %format_args!("{err:#}"),
                    "err executing task, ttl is not zero, moving to dlx"
                );
                // handler は同じ tx を使うので DLX を読み直してから追記する
                let mut dead: Vec<TaskRecord<T>> = get_json_default(tx, &dlx, Vec::new())?;
                dead.push(task);
                set_json(tx, &dlx, &dead)?;
                TaskOutcome::DeadLettered { ttl }
            }
        };

        Ok(Some(Processed {
            name: self.name.clone(),
            source,
            outcome,
        }))
    }
}
