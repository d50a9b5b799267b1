//! Logging setup and status views.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Sizes of one task name's lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub dead_lettered: usize,
}

impl QueueCounts {
    pub fn is_empty(&self) -> bool {
        self.queued == 0 && self.dead_lettered == 0
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level`. Calling this twice is a no-op
/// (the second install fails quietly).
pub fn init_tracing(config: &LogConfig) {
    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref(), config);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// `rust_log` when it parses, else the configured level.
fn log_filter(rust_log: Option<&str>, config: &LogConfig) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(&config.level))
}
