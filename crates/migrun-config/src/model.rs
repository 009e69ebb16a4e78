use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Prefix in a configured directory that stands for the config file's directory.
pub const ROOT_PLACEHOLDER: &str = "DIR_ROOT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
}

impl AppConfig {
    /// Resolve relative and `DIR_ROOT`-prefixed paths against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.migrations.directory = resolve_path(&self.migrations.directory, base);
        if let Some(path) = &self.database.path {
            self.database.path = Some(resolve_path(path, base));
        }
    }
}

/// Connection settings for the database holding the version table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: String,
    /// Database file, for file-backed drivers such as SQLite.
    pub path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: None,
            host: None,
            port: None,
            name: None,
            user: None,
            password: None,
        }
    }
}

impl DatabaseConfig {
    /// `driver:host=...;port=...;dbname=...`, omitting unset parts.
    pub fn dsn(&self) -> String {
        let mut parts = Vec::new();
        if let Some(host) = &self.host {
            parts.push(format!("host={host}"));
        }
        if let Some(port) = self.port {
            parts.push(format!("port={port}"));
        }
        if let Some(name) = &self.name {
            parts.push(format!("dbname={name}"));
        }
        format!("{}:{}", self.driver, parts.join(";"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub directory: PathBuf,
    /// File extension without the leading dot.
    pub extension: String,
    pub version_table: String,
    /// Description written into new files. `CURRENT_USER` and
    /// `CURRENT_DATE` are substituted.
    pub default_description: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("migrations"),
            extension: "sql".to_string(),
            version_table: "migration_versions".to_string(),
            default_description: String::new(),
        }
    }
}

impl MigrationsConfig {
    pub fn expand_description(&self, user: &str, now: NaiveDateTime) -> String {
        self.default_description
            .replace("CURRENT_USER", user)
            .replace("CURRENT_DATE", &now.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix(ROOT_PLACEHOLDER) {
        return base.join(rest);
    }
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
