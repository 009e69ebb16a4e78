use migrun_common::Result;
use serde::Serialize;

use crate::id;
use crate::status::{AppliedIdSource, ExecutionStatus};

/// One parsed migration file: identity, header metadata and the ordered
/// UP / DOWN statements.
///
/// Built by [`crate::parser`]. The setters exist for the parser; callers
/// normally only read.
#[derive(Debug, Clone, Serialize)]
pub struct Migration {
    migration_id: String,
    date: String,
    name: String,
    description: String,
    is_skip: bool,
    up_sql: Vec<String>,
    down_sql: Vec<String>,
    #[serde(skip)]
    status: ExecutionStatus,
}

impl Migration {
    /// Create an empty migration, deriving the date from the ID prefix.
    pub fn new(migration_id: impl Into<String>) -> Result<Self> {
        let migration_id = migration_id.into();
        let date = id::derive_date(&migration_id)?;
        Ok(Self {
            migration_id,
            date,
            name: String::new(),
            description: String::new(),
            is_skip: false,
            up_sql: Vec::new(),
            down_sql: Vec::new(),
            status: ExecutionStatus::default(),
        })
    }

    pub fn migration_id(&self) -> &str {
        &self.migration_id
    }

    /// The ID suffix as words, e.g. `add users table`.
    pub fn clear_name(&self) -> String {
        id::clear_name(&self.migration_id)
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn set_date(&mut self, date: impl Into<String>) -> &mut Self {
        self.date = date.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    pub fn is_skip(&self) -> bool {
        self.is_skip
    }

    pub fn set_skip(&mut self, skip: bool) -> &mut Self {
        self.is_skip = skip;
        self
    }

    /// Append a forward statement. Blank statements are ignored.
    pub fn add_up_sql(&mut self, sql: impl Into<String>) -> &mut Self {
        push_statement(&mut self.up_sql, sql.into());
        self
    }

    /// Append a rollback statement. Blank statements are ignored.
    pub fn add_down_sql(&mut self, sql: impl Into<String>) -> &mut Self {
        push_statement(&mut self.down_sql, sql.into());
        self
    }

    pub fn up_sql(&self) -> &[String] {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &[String] {
        &self.down_sql
    }

    /// The rollback statement at `index`, or `""` when out of range.
    pub fn down_sql_item(&self, index: usize) -> &str {
        self.down_sql.get(index).map_or("", String::as_str)
    }

    /// Whether this migration's ID is among the applied IDs of `source`.
    ///
    /// The first call queries `source`; the answer is cached for the life of
    /// this value and later calls never query again.
    pub fn is_executed(&mut self, source: &dyn AppliedIdSource) -> Result<bool> {
        self.status.resolve(&self.migration_id, source)
    }

    /// The cached execution status, if it has been resolved or set.
    pub fn executed(&self) -> Option<bool> {
        self.status.cached()
    }

    pub fn set_is_executed(&mut self, executed: bool) -> &mut Self {
        self.status.set(executed);
        self
    }
}

fn push_statement(statements: &mut Vec<String>, sql: String) {
    if !sql.trim().is_empty() {
        statements.push(sql);
    }
}
