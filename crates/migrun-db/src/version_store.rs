use std::collections::HashSet;
use std::path::Path;
use std::sync::{LazyLock, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use migrun_common::{Error, Result};
use migrun_core::AppliedIdSource;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("valid table regex"));

/// The version table: one row per applied migration ID.
pub struct VersionStore {
    conn: Mutex<Connection>,
    table: String,
}

impl VersionStore {
    pub fn open(db_path: &Path, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        info!("opening version store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        };
        store.ensure_table()?;
        Ok(store)
    }

    pub fn in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        };
        store.ensure_table()?;
        Ok(store)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("version store lock poisoned".into()))
    }

    fn ensure_table(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                migration_id TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
            self.table
        ))
        .map_err(|e| Error::Database(format!("failed to create version table: {e}")))?;
        Ok(())
    }

    /// Applied IDs in ascending order.
    pub fn applied_ids(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT migration_id FROM {} ORDER BY migration_id ASC",
                self.table
            ))
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to query version table: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read version row: {e}")))
    }

    /// When `migration_id` was recorded, if it is applied.
    ///
    /// An unreadable `applied_at` value is an error, not a guess.
    pub fn applied_at(&self, migration_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.connection()?;
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT applied_at FROM {} WHERE migration_id = ?1", self.table),
                params![migration_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to query version row: {e}")))?;

        raw.map(|value| parse_datetime(migration_id, &value))
            .transpose()
    }

    pub fn is_applied(&self, migration_id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE migration_id = ?1", self.table),
                params![migration_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to query version row: {e}")))?;
        Ok(found.is_some())
    }

    pub fn mark_applied(&self, migration_id: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            &format!("INSERT INTO {} (migration_id) VALUES (?1)", self.table),
            params![migration_id],
        )
        .map_err(|e| Error::Database(format!("failed to record {migration_id}: {e}")))?;
        debug!("recorded {migration_id} in {}", self.table);
        Ok(())
    }

    pub fn mark_reverted(&self, migration_id: &str) -> Result<()> {
        let conn = self.connection()?;
        let removed = conn
            .execute(
                &format!("DELETE FROM {} WHERE migration_id = ?1", self.table),
                params![migration_id],
            )
            .map_err(|e| Error::Database(format!("failed to remove {migration_id}: {e}")))?;
        if removed == 0 {
            return Err(Error::NotFound(format!(
                "{migration_id} is not recorded in {}",
                self.table
            )));
        }
        debug!("removed {migration_id} from {}", self.table);
        Ok(())
    }

    /// Run one migration statement.
    ///
    /// Uses `execute_batch` so routine bodies with inner terminators go
    /// through unchanged.
    pub fn execute(&self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(sql)
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub fn applied_count(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .map_err(|e| Error::Database(format!("failed to count versions: {e}")))?;
        Ok(count as usize)
    }
}

impl AppliedIdSource for VersionStore {
    fn list_applied_ids(&self) -> Result<HashSet<String>> {
        Ok(self.applied_ids()?.into_iter().collect())
    }
}

fn validate_table_name(name: &str) -> Result<()> {
    if TABLE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "version table name '{name}' is not a valid SQL identifier"
        )))
    }
}

fn parse_datetime(migration_id: &str, s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            Error::Database(format!(
                "invalid applied_at '{s}' recorded for {migration_id}: {e}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_creates_version_table() {
        let store = VersionStore::in_memory("schema_versions").unwrap();
        let conn = store.connection().expect("lock not poisoned");
        let exists: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='schema_versions'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(exists, 1);
    }

    #[test]
    fn rejects_injectable_table_names() {
        for name in ["", "1versions", "versions; DROP TABLE x", "a-b", "\"quoted\""] {
            let err = VersionStore::in_memory(name).err().unwrap();
            assert!(matches!(err, Error::Config(_)), "accepted {name:?}");
        }
    }

    #[test]
    fn mark_and_list_applied_ids() {
        let store = VersionStore::in_memory("versions").unwrap();
        store.mark_applied("20240201000000_b").unwrap();
        store.mark_applied("20240101000000_a").unwrap();

        assert_eq!(
            store.applied_ids().unwrap(),
            vec!["20240101000000_a", "20240201000000_b"]
        );
        assert_eq!(store.applied_count().unwrap(), 2);
        assert!(store.is_applied("20240101000000_a").unwrap());
        assert!(!store.is_applied("20240301000000_c").unwrap());
    }

    #[test]
    fn duplicate_mark_fails() {
        let store = VersionStore::in_memory("versions").unwrap();
        store.mark_applied("20240101000000_a").unwrap();
        assert!(matches!(
            store.mark_applied("20240101000000_a"),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn mark_reverted_removes_row() {
        let store = VersionStore::in_memory("versions").unwrap();
        store.mark_applied("20240101000000_a").unwrap();
        store.mark_reverted("20240101000000_a").unwrap();

        assert!(store.applied_ids().unwrap().is_empty());
        assert!(matches!(
            store.mark_reverted("20240101000000_a"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn applied_at_parses_sqlite_timestamp() {
        let store = VersionStore::in_memory("versions").unwrap();
        store.mark_applied("20240101000000_a").unwrap();

        let at = store.applied_at("20240101000000_a").unwrap().unwrap();
        assert!((Utc::now() - at).num_minutes().abs() < 5);
        assert!(store.applied_at("missing").unwrap().is_none());
    }

    #[test]
    fn corrupt_applied_at_is_an_error() {
        let store = VersionStore::in_memory("versions").unwrap();
        store
            .execute("INSERT INTO versions (migration_id, applied_at) VALUES ('20240101000000_a', 'last tuesday');")
            .unwrap();

        let err = store.applied_at("20240101000000_a").unwrap_err();
        assert!(matches!(&err, Error::Database(msg) if msg.contains("last tuesday")));
        assert!(store.is_applied("20240101000000_a").unwrap());
    }

    #[test]
    fn parse_datetime_accepts_rfc3339_and_sqlite_formats() {
        let sqlite = parse_datetime("x", "2024-01-02 03:04:05").unwrap();
        let rfc = parse_datetime("x", "2024-01-02T03:04:05Z").unwrap();
        assert_eq!(sqlite, rfc);
        assert!(parse_datetime("x", "").is_err());
    }

    #[test]
    fn serves_as_applied_id_source() {
        let store = VersionStore::in_memory("versions").unwrap();
        store.mark_applied("20240101000000_a").unwrap();

        let ids = store.list_applied_ids().unwrap();
        assert!(ids.contains("20240101000000_a"));
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn execute_reports_sql_errors() {
        let store = VersionStore::in_memory("versions").unwrap();
        store.execute("CREATE TABLE t (id INTEGER);").unwrap();
        assert!(matches!(
            store.execute("INSERT INTO missing VALUES (1);"),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn open_persists_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = VersionStore::open(&path, "versions").unwrap();
            store.mark_applied("20240101000000_a").unwrap();
        }
        let store = VersionStore::open(&path, "versions").unwrap();
        assert_eq!(store.applied_ids().unwrap(), vec!["20240101000000_a"]);
    }
}
