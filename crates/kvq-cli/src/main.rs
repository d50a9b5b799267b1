use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use kvq_core::observability::{QueueCounts, init_tracing};
use kvq_core::queue::{self, Handler, Queue, Registry};
use kvq_core::store::{self, Migration, Store, Txn, get_json_default, set_json};
use kvq_core::{Config, Shutdown, shutdown};

const DEMO_TASK: &str = "demo:hello";
const DEMO_GREETED_KEY: &str = "demo:greeted";

#[derive(Debug, Parser)]
#[command(name = "kvq", about = "Inspect and exercise a kvq store")]
struct Cli {
    /// Config file (defaults to $KVQ_CONFIG, then kvq.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write every key of the store as one JSON object
    Dump {
        #[arg(long, default_value = "kvq_dump.json")]
        out: PathBuf,
        /// Compress the dump with gzip (best compression)
        #[arg(long)]
        gzip: bool,
    },
    /// Load a dump written by `dump` (gzip is detected automatically)
    Restore {
        #[arg(long)]
        input: PathBuf,
    },
    /// Print list sizes for the given task names and the applied migrations
    Inspect { names: Vec<String> },
    /// Schedule a task that fails a few times, then run the consumer until it drains
    Demo {
        #[arg(long, default_value_t = 2)]
        failures: u32,
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HelloArgs {
    name: String,
}

struct HelloHandler {
    remaining_failures: AtomicU32,
}

impl HelloHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Handler<HelloArgs> for HelloHandler {
    async fn handle(&self, _shutdown: &Shutdown, tx: &mut Txn, args: HelloArgs) -> anyhow::Result<()> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            anyhow::bail!("intentional failure (left={left})");
        }

        let mut greeted: Vec<String> = get_json_default(tx, DEMO_GREETED_KEY, Vec::new())?;
        greeted.push(args.name.clone());
        set_json(tx, DEMO_GREETED_KEY, &greeted)?;
        println!("Hello, {}!", args.name);
        Ok(())
    }
}

fn demo_migrations() -> Vec<Migration> {
    vec![Migration::new("0001", "seed demo greeted list", |tx| {
        set_json(tx, DEMO_GREETED_KEY, &Vec::<String>::new())?;
        Ok(())
    })]
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

async fn write_dump<W: Write>(store: &Store, writer: W, gzip: bool) -> anyhow::Result<usize> {
    let keys = if gzip {
        let mut encoder = GzEncoder::new(writer, Compression::best());
        let keys = store::dump_json(store, &mut encoder).await?;
        encoder.finish()?.flush()?;
        keys
    } else {
        let mut writer = writer;
        let keys = store::dump_json(store, &mut writer).await?;
        writer.flush()?;
        keys
    };
    Ok(keys)
}

fn dump_reader<R: BufRead + 'static>(mut reader: R) -> std::io::Result<Box<dyn Read>> {
    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        return Ok(Box::new(GzDecoder::new(reader)));
    }
    Ok(Box::new(reader))
}

#[derive(Debug, Serialize)]
struct Inspection {
    queues: BTreeMap<String, QueueCounts>,
    migrations: Vec<String>,
}

async fn inspect(store: &Store, config: &Config, names: Vec<String>) -> anyhow::Result<()> {
    let mut queues = BTreeMap::new();
    {
        let tx = store.begin().await;
        for name in names {
            let counts = queue::counts(&tx, &name).with_context(|| format!("read lists of {name}"))?;
            queues.insert(name, counts);
        }
    }
    let migrations = store::applied_migrations(store, &config.migrations.key)
        .await?
        .applied
        .into_iter()
        .map(|m| format!("{} {} {}", m.id, m.applied_at.to_rfc3339(), m.name))
        .collect();

    let out = serde_json::to_string_pretty(&Inspection { queues, migrations })?;
    println!("{out}");
    Ok(())
}

async fn demo(store: Store, config: &Config, failures: u32, retries: u32) -> anyhow::Result<()> {
    let applied = store::migrate(&store, &config.migrations.key, &demo_migrations()).await?;
    info!(?applied, "demo migrations");

    // (A) Registry に handler を登録して Queue に bind
    let mut registry = Registry::with_wake_capacity(config.queue.wake_capacity);
    let hello = registry.register(DEMO_TASK, HelloHandler::new(failures))?;
    let mut consumer = Queue::new(&mut registry, store.clone())?.with_drain_policy(config.queue.drain);

    // (B) consumer loop を起動
    let (trigger, shutdown) = shutdown::channel();
    let trigger = Arc::new(trigger);
    {
        let trigger = Arc::clone(&trigger);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, shutting down");
                trigger.trigger();
            }
        });
    }
    let poll_delay = config.queue.poll_delay();
    let worker = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { consumer.start_handlers(shutdown, poll_delay).await })
    };

    // (C) タスク投入
    let mut tx = store.begin().await;
    hello.schedule(
        &mut tx,
        retries,
        HelloArgs {
            name: "kvq".to_string(),
        },
    )?;
    tx.commit()?;

    // (D) 両リストが空になるまで待つ
    while !shutdown.is_shutdown() {
        let counts = {
            let tx = store.begin().await;
            queue::counts(&tx, DEMO_TASK)?
        };
        if counts.is_empty() {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    // (E) graceful shutdown
    trigger.trigger();
    worker.await.context("join consumer loop")?;

    let greeted: Vec<String> = {
        let tx = store.begin().await;
        get_json_default(&tx, DEMO_GREETED_KEY, Vec::new())?
    };
    println!("greeted: {greeted:?}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_or_default(&config_path)?;
    init_tracing(&config.log);

    let store = Store::from_config(&config.store)
        .with_context(|| format!("open store {}", config.store.path.display()))?;

    match cli.command {
        Command::Dump { out, gzip } => {
            let file = File::create(&out).with_context(|| format!("create {}", out.display()))?;
            let keys = write_dump(&store, BufWriter::new(file), gzip).await?;
            println!("dumped {keys} keys to {}", out.display());
        }
        Command::Restore { input } => {
            let file = File::open(&input).with_context(|| format!("open {}", input.display()))?;
            let reader = dump_reader(BufReader::new(file))?;
            let keys = store::restore_json(&store, reader).await?;
            println!("restored {keys} keys from {}", input.display());
        }
        Command::Inspect { names } => inspect(&store, &config, names).await?,
        Command::Demo { failures, retries } => demo(store, &config, failures, retries).await?,
    }
    Ok(())
}
