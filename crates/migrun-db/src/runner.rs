use chrono::{DateTime, Utc};
use migrun_common::{Error, Result};
use migrun_core::{AppliedIds, Migration};
use serde::Serialize;
use tracing::{info, warn};

use crate::version_store::VersionStore;

/// What happened to one migration during `migrate` or `rollback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Applied { statements: usize },
    Reverted { statements: usize },
    /// Marked with `Skip: yes`; bookkeeping only, no SQL ran.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub migration_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// One row of `status` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub migration_id: String,
    pub name: String,
    pub date: String,
    pub executed: bool,
    pub skip: bool,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Applies and reverts parsed migrations against a [`VersionStore`].
///
/// Statements run one at a time with no surrounding transaction; a failure
/// stops the run and leaves the failing migration unrecorded.
pub struct Runner<'a> {
    store: &'a VersionStore,
}

impl<'a> Runner<'a> {
    pub fn new(store: &'a VersionStore) -> Self {
        Self { store }
    }

    /// Resolve the execution status of every migration with one query, then
    /// look up when each applied one was recorded.
    pub fn status(&self, migrations: &mut [Migration]) -> Result<Vec<StatusLine>> {
        let applied = AppliedIds::preload(self.store)?;
        applied.apply_to(migrations);

        migrations
            .iter()
            .map(|m| {
                let executed = m.executed().unwrap_or(false);
                let applied_at = if executed {
                    self.store.applied_at(m.migration_id())?
                } else {
                    None
                };
                Ok(StatusLine {
                    migration_id: m.migration_id().to_string(),
                    name: display_name(m),
                    date: m.date().to_string(),
                    executed,
                    skip: m.is_skip(),
                    applied_at,
                })
            })
            .collect()
    }

    /// Applied IDs that have no migration file among `migrations`.
    pub fn orphans(&self, migrations: &[Migration]) -> Result<Vec<String>> {
        let mut orphans = self.store.applied_ids()?;
        orphans.retain(|id| !migrations.iter().any(|m| m.migration_id() == id));
        for id in &orphans {
            warn!("{id} is recorded as applied but has no migration file");
        }
        Ok(orphans)
    }

    /// Apply pending migrations in ID order, at most `limit` of them.
    pub fn migrate(
        &self,
        migrations: &mut [Migration],
        limit: Option<usize>,
    ) -> Result<Vec<MigrationReport>> {
        let applied = AppliedIds::preload(self.store)?;
        applied.apply_to(migrations);
        migrations.sort_by(|a, b| a.migration_id().cmp(b.migration_id()));

        let mut reports = Vec::new();
        for migration in migrations.iter_mut() {
            if limit.is_some_and(|limit| reports.len() >= limit) {
                break;
            }
            if migration.executed() == Some(true) {
                continue;
            }
            reports.push(self.apply(migration)?);
        }

        if reports.is_empty() {
            info!("nothing to migrate");
        }
        Ok(reports)
    }

    /// Apply one migration regardless of its cached status.
    ///
    /// Checks the version table first so no SQL runs for a recorded ID.
    pub fn apply(&self, migration: &mut Migration) -> Result<MigrationReport> {
        let id = migration.migration_id().to_string();
        if self.store.is_applied(&id)? {
            migration.set_is_executed(true);
            return Err(Error::Other(format!("migration {id} is already applied")));
        }

        let outcome = if migration.is_skip() {
            info!("skipping {id} (marked Skip: yes)");
            Outcome::Skipped
        } else {
            self.run_statements(&id, migration.up_sql(), "up")?;
            info!("applied {id} ({} statements)", migration.up_sql().len());
            Outcome::Applied {
                statements: migration.up_sql().len(),
            }
        };

        self.store.mark_applied(&id)?;
        migration.set_is_executed(true);
        Ok(MigrationReport {
            migration_id: id,
            outcome,
        })
    }

    /// Run a migration's DOWN statements and remove it from the version table.
    pub fn rollback(&self, migration: &mut Migration) -> Result<MigrationReport> {
        let id = migration.migration_id().to_string();
        if !migration.is_executed(self.store)? {
            return Err(Error::NotFound(format!("migration {id} is not applied")));
        }

        let outcome = if migration.is_skip() {
            info!("un-recording skipped migration {id}");
            Outcome::Skipped
        } else {
            self.run_statements(&id, migration.down_sql(), "down")?;
            info!("reverted {id} ({} statements)", migration.down_sql().len());
            Outcome::Reverted {
                statements: migration.down_sql().len(),
            }
        };

        self.store.mark_reverted(&id)?;
        migration.set_is_executed(false);
        Ok(MigrationReport {
            migration_id: id,
            outcome,
        })
    }

    /// Revert the `count` most recent applied migrations, newest first.
    pub fn rollback_last(
        &self,
        migrations: &mut [Migration],
        count: usize,
    ) -> Result<Vec<MigrationReport>> {
        let applied = AppliedIds::preload(self.store)?;
        applied.apply_to(migrations);
        migrations.sort_by(|a, b| b.migration_id().cmp(a.migration_id()));

        let mut reports = Vec::new();
        for migration in migrations
            .iter_mut()
            .filter(|m| m.executed() == Some(true))
            .take(count)
        {
            reports.push(self.rollback(migration)?);
        }

        if reports.is_empty() {
            info!("nothing to roll back");
        }
        Ok(reports)
    }

    fn run_statements(&self, id: &str, statements: &[String], direction: &str) -> Result<()> {
        for (index, sql) in statements.iter().enumerate() {
            self.store.execute(sql).map_err(|e| {
                let detail = match e {
                    Error::Database(msg) => msg,
                    other => other.to_string(),
                };
                Error::Database(format!(
                    "{id} {direction} statement {} failed: {detail}",
                    index + 1
                ))
            })?;
        }
        Ok(())
    }
}

fn display_name(migration: &Migration) -> String {
    if migration.name().is_empty() {
        migration.clear_name()
    } else {
        migration.name().to_string()
    }
}
