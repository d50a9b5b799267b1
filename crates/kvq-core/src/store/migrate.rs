//! Idempotent migration runner.
//!
//! The whole run is one transaction: the applied set is read, every pending
//! migration runs against the same `Txn`, and the updated set is written back
//! before commit. If any migration fails, nothing from this run is kept,
//! including migrations that succeeded earlier in it, and none of them are
//! marked applied. The next start re-runs them from the top, so every
//! migration body must be safe to execute more than once.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::json::{get_json_default, set_json};
use super::{Store, Txn};
use crate::error::StoreError;

type ApplyFn = Box<dyn Fn(&mut Txn) -> anyhow::Result<()> + Send + Sync>;

pub struct Migration {
    pub id: String,
    pub name: String,
    apply: ApplyFn,
}

impl Migration {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        apply: impl Fn(&mut Txn) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            apply: Box::new(apply),
        }
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Bookkeeping document stored under the migrations key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigrations {
    pub applied: Vec<AppliedMigration>,
}

/// Apply every migration in `migrations` whose id is not yet recorded under
/// `applied_key`. Returns the ids applied by this call, in order.
pub async fn migrate(
    store: &Store,
    applied_key: &str,
    migrations: &[Migration],
) -> Result<Vec<String>, StoreError> {
    info!(key = applied_key, total = migrations.len(), "applying migrations");

    let mut tx = store.begin().await;
    let mut applied: AppliedMigrations =
        get_json_default(&tx, applied_key, AppliedMigrations::default())?;
    let mut done: HashSet<String> = applied.applied.iter().map(|m| m.id.clone()).collect();

    let mut newly_applied = Vec::new();
    for migration in migrations {
        if done.contains(&migration.id) {
            info!(
                id = %migration.id,
                name = %migration.name,
                "migration already applied, skipping"
            );
            continue;
        }

        info!(id = %migration.id, name = %migration.name, "applying migration");
        (migration.apply)(&mut tx).map_err(|reason| StoreError::Migration {
            id: migration.id.clone(),
            name: migration.name.clone(),
            reason,
        })?;

        applied.applied.push(AppliedMigration {
            id: migration.id.clone(),
            name: migration.name.clone(),
            applied_at: Utc::now(),
        });
        done.insert(migration.id.clone());
        newly_applied.push(migration.id.clone());
    }

    set_json(&mut tx, applied_key, &applied)?;
    tx.commit()?;

    info!(applied = newly_applied.len(), "migrations applied");
    Ok(newly_applied)
}

pub async fn applied_migrations(
    store: &Store,
    applied_key: &str,
) -> Result<AppliedMigrations, StoreError> {
    let tx = store.begin().await;
    get_json_default(&tx, applied_key, AppliedMigrations::default())
}
