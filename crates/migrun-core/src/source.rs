use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use migrun_common::{Error, Result};
use tracing::{debug, info};

use crate::id;
use crate::template;

/// Reads migration file content.
pub trait FileReader {
    /// Return the file's text, or [`Error::FileNotFound`] if it is missing.
    fn read(&self, path: &Path) -> Result<String>;
}

/// Reads from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

impl FileReader for FsReader {
    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })
    }
}

/// Where migration files live: `<directory>/<migration_id>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationLocator {
    directory: PathBuf,
    extension: String,
}

impl MigrationLocator {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            directory: directory.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn path_for(&self, migration_id: &str) -> PathBuf {
        self.directory
            .join(format!("{migration_id}.{}", self.extension))
    }

    /// All migration IDs in the directory, sorted ascending.
    ///
    /// Files with another extension, or whose stem lacks the timestamp
    /// prefix, are ignored.
    pub fn discover(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.directory).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::FileNotFound(self.directory.clone()),
            _ => Error::Io(e),
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let matches_ext = path
                .extension()
                .is_some_and(|ext| ext == self.extension.as_str());
            if !matches_ext {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if id::is_migration_id(stem) => ids.push(stem.to_string()),
                _ => debug!("ignoring non-migration file {}", path.display()),
            }
        }

        ids.sort();
        debug!(
            "discovered {} migrations in {}",
            ids.len(),
            self.directory.display()
        );
        Ok(ids)
    }

    /// Write a new, empty migration file and return its ID.
    ///
    /// Refuses to overwrite an existing file.
    pub fn create(&self, label: &str, description: &str, now: NaiveDateTime) -> Result<String> {
        let migration_id = id::new_id(now, label);
        let path = self.path_for(&migration_id);

        std::fs::create_dir_all(&self.directory)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::Other(format!(
                    "migration file {} already exists",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(template::render(label.trim(), description).as_bytes())?;

        info!("created migration {}", path.display());
        Ok(migration_id)
    }
}
