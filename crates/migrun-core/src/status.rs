use std::collections::HashSet;

use migrun_common::Result;
use tracing::debug;

use crate::migration::Migration;

/// External record of which migration IDs have already been applied.
///
/// Implementations are read-only from the parser's point of view; the
/// version table in `migrun-db` is the production one.
pub trait AppliedIdSource {
    fn list_applied_ids(&self) -> Result<HashSet<String>>;
}

impl AppliedIdSource for HashSet<String> {
    fn list_applied_ids(&self) -> Result<HashSet<String>> {
        Ok(self.clone())
    }
}

/// Memoized execution status of a single migration.
///
/// Not synchronized: resolving takes `&mut self`, so one owner at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ExecutionStatus {
    cached: Option<bool>,
}

impl ExecutionStatus {
    pub(crate) fn resolve(
        &mut self,
        migration_id: &str,
        source: &dyn AppliedIdSource,
    ) -> Result<bool> {
        if let Some(executed) = self.cached {
            return Ok(executed);
        }
        let executed = source.list_applied_ids()?.contains(migration_id);
        debug!("resolved execution status of {migration_id}: {executed}");
        self.cached = Some(executed);
        Ok(executed)
    }

    pub(crate) fn set(&mut self, executed: bool) {
        self.cached = Some(executed);
    }

    pub(crate) fn cached(&self) -> Option<bool> {
        self.cached
    }
}

/// Applied IDs loaded once and shared across a batch of migrations.
#[derive(Debug, Clone, Default)]
pub struct AppliedIds {
    ids: HashSet<String>,
}

impl AppliedIds {
    /// Query `source` once and keep the result.
    pub fn preload(source: &dyn AppliedIdSource) -> Result<Self> {
        let ids = source.list_applied_ids()?;
        debug!("preloaded {} applied migration ids", ids.len());
        Ok(Self { ids })
    }

    pub fn contains(&self, migration_id: &str) -> bool {
        self.ids.contains(migration_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Stamp the execution status on every migration without further queries.
    pub fn apply_to(&self, migrations: &mut [Migration]) {
        for migration in migrations {
            let executed = self.contains(migration.migration_id());
            migration.set_is_executed(executed);
        }
    }
}

impl AppliedIdSource for AppliedIds {
    fn list_applied_ids(&self) -> Result<HashSet<String>> {
        Ok(self.ids.clone())
    }
}
