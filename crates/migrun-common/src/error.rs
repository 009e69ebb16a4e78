use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration file {} not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("malformed migration identifier '{0}': expected a YYYYMMDDHHMMSS prefix")]
    MalformedIdentifier(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::Error;

    #[test]
    fn error_display_includes_context() {
        let e = Error::Config("bad yaml".into());
        assert_eq!(e.to_string(), "configuration error: bad yaml");

        let e = Error::Database("locked".into());
        assert_eq!(e.to_string(), "database error: locked");

        let e = Error::Other("misc".into());
        assert_eq!(e.to_string(), "misc");
    }

    #[test]
    fn file_not_found_shows_path() {
        let e = Error::FileNotFound(PathBuf::from("migrations/20240101120000.sql"));
        assert_eq!(
            e.to_string(),
            "migration file migrations/20240101120000.sql not found"
        );
    }

    #[test]
    fn malformed_identifier_names_the_id() {
        let e = Error::MalformedIdentifier("2024_add_users".into());
        assert!(e.to_string().contains("'2024_add_users'"));
    }
}
