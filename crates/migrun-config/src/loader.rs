use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use migrun_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// File names probed, in order, when no config path is given.
pub const DEFAULT_CONFIG_FILES: [&str; 4] =
    ["migrun.yml", "migrun.yaml", "migrun.toml", ".environment"];

/// Keys an `.environment` file must define.
const REQUIRED_ENV_KEYS: [&str; 4] = [
    "DATABASE_DRIVER",
    "VERSION_TABLE_NAME",
    "FILE_EXTENSION",
    "DIR_MIGRATION",
];

pub struct ConfigLoader;

impl ConfigLoader {
    /// First of [`DEFAULT_CONFIG_FILES`] that exists in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load a config file, picking the format from its name.
    ///
    /// `.yml`/`.yaml` and `.toml` are parsed with serde; anything else is
    /// read as `KEY=VALUE` lines. Paths are resolved against the file's
    /// directory.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                Error::Config(format!("config file {} not found", path.display()))
            }
            _ => Error::Io(e),
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mut config = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
            _ => Self::from_env_str(&contents)?,
        };

        let base = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(base);

        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if given, else from the first default file in `dir`,
    /// else fall back to defaults rooted at `dir`.
    pub fn load_or_default(path: Option<&Path>, dir: &Path) -> Result<AppConfig> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::discover(dir) {
            Some(found) => Self::load(&found),
            None => {
                debug!("no config file in {}, using defaults", dir.display());
                let mut config = AppConfig::default();
                config.resolve_paths(dir);
                Ok(config)
            }
        }
    }

    /// Parse `KEY=VALUE` environment-file text.
    pub fn from_env_str(contents: &str) -> Result<AppConfig> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_read_iter(contents.as_bytes()) {
            let (key, value) =
                item.map_err(|e| Error::Config(format!("environment file parse error: {e}")))?;
            vars.insert(key, value.trim().to_string());
        }

        if let Some(missing) = REQUIRED_ENV_KEYS.iter().find(|k| !vars.contains_key(**k)) {
            return Err(Error::Config(format!("required parameter {missing} is not set")));
        }

        let mut config = AppConfig::default();
        let mut take = |key: &str| vars.remove(key).filter(|v| !v.is_empty());

        if let Some(driver) = take("DATABASE_DRIVER") {
            config.database.driver = driver;
        }
        config.database.path = take("DATABASE_PATH").map(PathBuf::from);
        config.database.host = take("DATABASE_HOST");
        config.database.name = take("DATABASE_NAME");
        config.database.user = take("DATABASE_USER");
        config.database.password = take("DATABASE_PASSWORD");
        config.database.port = take("DATABASE_PORT")
            .map(|port| {
                port.parse()
                    .map_err(|_| Error::Config(format!("DATABASE_PORT '{port}' is not a port")))
            })
            .transpose()?;

        if let Some(table) = take("VERSION_TABLE_NAME") {
            config.migrations.version_table = table;
        }
        if let Some(ext) = take("FILE_EXTENSION") {
            config.migrations.extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(dir) = take("DIR_MIGRATION") {
            config.migrations.directory = PathBuf::from(dir);
        }
        if let Some(description) = take("DEFAULT_DESCRIPTION_MESSAGE") {
            config.migrations.default_description = description;
        }

        Ok(config)
    }
}
