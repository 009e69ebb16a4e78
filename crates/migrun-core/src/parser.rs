use std::sync::LazyLock;

use migrun_common::Result;
use regex::Regex;
use tracing::debug;

use crate::migration::Migration;
use crate::source::{FileReader, FsReader, MigrationLocator};
use crate::statements::extract_statements;

static SKIP_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-- *Skip *:").expect("valid skip regex"));

static SECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-- *(UP|DOWN) *--").expect("valid section marker regex")
});

static FIELD_HEADERS: LazyLock<Vec<(HeaderField, Regex)>> = LazyLock::new(|| {
    HeaderField::ALL
        .into_iter()
        .map(|field| {
            let pattern = format!(r"-- *{} *:", field.label());
            (field, Regex::new(&pattern).expect("valid header regex"))
        })
        .collect()
});

/// Text header fields, in matching order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderField {
    Name,
    Description,
    Date,
}

impl HeaderField {
    const ALL: [HeaderField; 3] = [Self::Name, Self::Description, Self::Date];

    fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Description => "Description",
            Self::Date => "Date",
        }
    }

    fn apply(self, migration: &mut Migration, value: &str) {
        match self {
            Self::Name => migration.set_name(value),
            Self::Description => migration.set_description(value),
            Self::Date => migration.set_date(value),
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Up,
    Down,
}

/// Parser position within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before any header or section marker.
    None,
    /// Right after a header line; no section is active.
    Header,
    Up,
    Down,
}

impl State {
    fn section(self) -> Option<Section> {
        match self {
            Self::Up => Some(Section::Up),
            Self::Down => Some(Section::Down),
            Self::None | Self::Header => None,
        }
    }
}

impl From<Section> for State {
    fn from(section: Section) -> Self {
        match section {
            Section::Up => Self::Up,
            Section::Down => Self::Down,
        }
    }
}

/// What a single line of a migration file means.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Skip(bool),
    Field(HeaderField, &'a str),
    Marker(Section),
    Content(&'a str),
}

impl<'a> Line<'a> {
    fn classify(line: &'a str) -> Self {
        if SKIP_HEADER.is_match(line) {
            return Self::Skip(header_value(line) == "yes");
        }

        for (field, pattern) in FIELD_HEADERS.iter() {
            if pattern.is_match(line) {
                return Self::Field(*field, header_value(line));
            }
        }

        if let Some(caps) = SECTION_MARKER.captures(line) {
            let section = if &caps[1] == "UP" {
                Section::Up
            } else {
                Section::Down
            };
            return Self::Marker(section);
        }

        Self::Content(line)
    }
}

/// Everything after the first `:`, trimmed.
fn header_value(line: &str) -> &str {
    line.split_once(':').map_or("", |(_, value)| value.trim())
}

struct SectionMachine<'a> {
    migration: Migration,
    state: State,
    buffer: Vec<&'a str>,
}

impl<'a> SectionMachine<'a> {
    fn new(migration: Migration) -> Self {
        Self {
            migration,
            state: State::None,
            buffer: Vec::new(),
        }
    }

    fn feed(&mut self, line: &'a str) {
        match Line::classify(line) {
            Line::Skip(skip) => {
                self.migration.set_skip(skip);
                self.leave_section();
            }
            Line::Field(field, value) => {
                field.apply(&mut self.migration, value);
                self.leave_section();
            }
            Line::Marker(section) => {
                self.flush();
                self.state = section.into();
            }
            Line::Content(text) => {
                if self.state.section().is_some() {
                    self.buffer.push(text);
                }
            }
        }
    }

    /// A header ends the active section without flushing it.
    fn leave_section(&mut self) {
        self.state = State::Header;
        self.buffer.clear();
    }

    fn flush(&mut self) {
        let lines = std::mem::take(&mut self.buffer);
        let Some(section) = self.state.section() else {
            return;
        };
        for statement in extract_statements(&lines) {
            match section {
                Section::Up => self.migration.add_up_sql(statement),
                Section::Down => self.migration.add_down_sql(statement),
            };
        }
    }

    fn finish(mut self) -> Migration {
        self.flush();
        self.migration
    }
}

/// Parse migration file text into a [`Migration`].
///
/// Fails only if `migration_id` lacks the 14-digit timestamp prefix.
pub fn parse_migration(migration_id: &str, content: &str) -> Result<Migration> {
    let mut machine = SectionMachine::new(Migration::new(migration_id)?);
    for line in content.lines() {
        machine.feed(line);
    }
    let migration = machine.finish();

    debug!(
        "parsed migration {}: {} up, {} down statements{}",
        migration.migration_id(),
        migration.up_sql().len(),
        migration.down_sql().len(),
        if migration.is_skip() { " (skip)" } else { "" }
    );
    Ok(migration)
}

/// Locates, reads and parses migration files.
pub struct MigrationParser {
    locator: MigrationLocator,
    reader: Box<dyn FileReader>,
}

impl MigrationParser {
    /// Parser reading from the local filesystem.
    pub fn new(locator: MigrationLocator) -> Self {
        Self::with_reader(locator, FsReader)
    }

    pub fn with_reader(locator: MigrationLocator, reader: impl FileReader + 'static) -> Self {
        Self {
            locator,
            reader: Box::new(reader),
        }
    }

    pub fn locator(&self) -> &MigrationLocator {
        &self.locator
    }

    /// Load the migration with the given ID.
    pub fn load(&self, migration_id: &str) -> Result<Migration> {
        // Reject a bad ID before touching the filesystem.
        Migration::new(migration_id)?;
        let path = self.locator.path_for(migration_id);
        let content = self.reader.read(&path)?;
        parse_migration(migration_id, &content)
    }

    /// Discover and load every migration, sorted by ID.
    pub fn load_all(&self) -> Result<Vec<Migration>> {
        self.locator
            .discover()?
            .iter()
            .map(|id| self.load(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use migrun_common::Error;

    use super::*;

    const ID: &str = "20240101120000_add_users_table";

    fn parse(text: &str) -> Migration {
        parse_migration(ID, text).unwrap()
    }

    struct MemoryReader(HashMap<PathBuf, String>);

    impl FileReader for MemoryReader {
        fn read(&self, path: &Path) -> Result<String> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| Error::FileNotFound(path.to_path_buf()))
        }
    }

    #[test]
    fn classify_matches_headers_anywhere_in_line() {
        assert_eq!(Line::classify("-- Skip: yes"), Line::Skip(true));
        assert_eq!(Line::classify("  --Skip :no"), Line::Skip(false));
        assert_eq!(
            Line::classify("INSERT INTO t VALUES (1); -- Name: legacy"),
            Line::Field(HeaderField::Name, "legacy")
        );
        assert_eq!(Line::classify("SELECT 1; -- DOWN --"), Line::Marker(Section::Down));
        assert_eq!(Line::classify(" --  UP  --"), Line::Marker(Section::Up));
        assert_eq!(Line::classify("-- name: lower"), Line::Content("-- name: lower"));
        assert_eq!(Line::classify("-- up --"), Line::Content("-- up --"));
    }

    #[test]
    fn trailing_header_comment_ends_section() {
        let m = parse_migration(
            "20240101120000_x",
            "-- UP --\nINSERT INTO t VALUES (1); -- Name: legacy\n-- DOWN --\nDELETE FROM t;",
        )
        .unwrap();
        assert_eq!(m.name(), "legacy");
        assert!(m.up_sql().is_empty());
        assert_eq!(m.down_sql(), &["DELETE FROM t;".to_string()]);
    }

    #[test]
    fn header_value_keeps_later_colons() {
        assert_eq!(header_value("-- Date: 01.01.2024 12:00:00"), "01.01.2024 12:00:00");
    }

    #[test]
    fn full_file_populates_every_field() {
        let m = parse(
            "-- Skip: no\n\
             -- Name: Initial schema\n\
             -- Description: Creates the users table\n\
             -- UP --\n\
             CREATE TABLE users (id INTEGER PRIMARY KEY);\n\
             \n\
             CREATE INDEX idx_users ON users(id);\n\
             -- DOWN --\n\
             DROP TABLE users;\n",
        );

        assert_eq!(m.name(), "Initial schema");
        assert_eq!(m.description(), "Creates the users table");
        assert_eq!(m.date(), "01.01.2024 12:00:00");
        assert!(!m.is_skip());
        assert_eq!(
            m.up_sql(),
            &[
                "CREATE TABLE users (id INTEGER PRIMARY KEY);".to_string(),
                "CREATE INDEX idx_users ON users(id);".to_string(),
            ]
        );
        assert_eq!(m.down_sql(), &["DROP TABLE users;".to_string()]);
    }

    #[test]
    fn skip_header_sets_flag() {
        assert!(parse("-- Skip: yes\n-- UP --\nSELECT 1;").is_skip());
        assert!(!parse("-- Skip: YES\n").is_skip());
        assert!(!parse("-- UP --\nSELECT 1;").is_skip());
    }

    #[test]
    fn name_header_is_trimmed() {
        assert_eq!(parse("-- Name: Initial schema   \n").name(), "Initial schema");
    }

    #[test]
    fn repeated_headers_overwrite() {
        let m = parse("-- Name: first\n-- Description: a\n-- Name: second\n");
        assert_eq!(m.name(), "second");
        assert_eq!(m.description(), "a");
    }

    #[test]
    fn date_header_overrides_derived_date() {
        assert_eq!(parse("-- Date: yesterday\n").date(), "yesterday");
    }

    #[test]
    fn no_markers_means_no_statements() {
        let m = parse("-- Name: nothing\nCREATE TABLE a (id INT);\n\nDROP TABLE a;\n");
        assert!(m.up_sql().is_empty());
        assert!(m.down_sql().is_empty());
    }

    #[test]
    fn stored_procedure_in_down_section_stays_whole() {
        let m = parse("-- UP --\nSELECT 1;\n-- DOWN --\nCREATE PROCEDURE foo()\nBEGIN\n\nSELECT 1;\n\nEND\n\n");
        assert_eq!(
            m.down_sql(),
            &["CREATE PROCEDURE foo()\nBEGIN\n\nSELECT 1;\n\nEND".to_string()]
        );
    }

    #[test]
    fn blank_lines_split_up_section() {
        let m = parse("-- UP --\nINSERT INTO a VALUES(1);\n\nINSERT INTO a VALUES(2);");
        assert_eq!(
            m.up_sql(),
            &[
                "INSERT INTO a VALUES(1);".to_string(),
                "INSERT INTO a VALUES(2);".to_string(),
            ]
        );
    }

    #[test]
    fn repeated_section_markers_append_in_order() {
        let m = parse("-- UP --\nA;\n-- DOWN --\nB;\n-- UP --\nC;\n");
        assert_eq!(m.up_sql(), &["A;".to_string(), "C;".to_string()]);
        assert_eq!(m.down_sql(), &["B;".to_string()]);
    }

    #[test]
    fn header_inside_section_discards_pending_lines() {
        let m = parse("-- UP --\nA;\n-- Name: late\nB;\n-- DOWN --\nC;\n");
        assert_eq!(m.name(), "late");
        assert!(m.up_sql().is_empty());
        assert_eq!(m.down_sql(), &["C;".to_string()]);
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let m = parse("-- Name: win\r\n-- UP --\r\nA;\r\n\r\nB;\r\n");
        assert_eq!(m.name(), "win");
        assert_eq!(m.up_sql(), &["A;".to_string(), "B;".to_string()]);
    }

    #[test]
    fn malformed_id_fails_before_parsing() {
        assert!(matches!(
            parse_migration("init", "-- UP --\nA;"),
            Err(Error::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn parser_reads_through_locator() {
        let locator = MigrationLocator::new("/migrations", "sql");
        let path = locator.path_for(ID);
        let reader = MemoryReader(HashMap::from([(path, "-- UP --\nSELECT 1;".to_string())]));
        let parser = MigrationParser::with_reader(locator, reader);

        let m = parser.load(ID).unwrap();
        assert_eq!(m.up_sql(), &["SELECT 1;".to_string()]);
        assert_eq!(m.clear_name(), "add users table");
    }

    #[test]
    fn parser_surfaces_missing_file() {
        let parser = MigrationParser::with_reader(
            MigrationLocator::new("/migrations", "sql"),
            MemoryReader(HashMap::new()),
        );
        let err = parser.load(ID).unwrap_err();
        assert!(
            matches!(err, Error::FileNotFound(p) if p == Path::new("/migrations/20240101120000_add_users_table.sql"))
        );
    }
}
