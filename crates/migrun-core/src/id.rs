use std::sync::LazyLock;

use chrono::NaiveDateTime;
use migrun_common::{Error, Result};
use regex::Regex;

/// Captures year, month, day, hour, minute and second from the 14-digit prefix.
static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(\d{2})(\d{2})(\d{2})(\d{2})(\d{2})").expect("valid timestamp regex")
});

/// Format used by [`new_id`] for the timestamp prefix.
const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Derive the display date (`DD.MM.YYYY HH:MM:SS`) from a migration ID.
///
/// The digits are copied as-is; no calendar validation happens here.
pub fn derive_date(migration_id: &str) -> Result<String> {
    let caps = TIMESTAMP_PREFIX
        .captures(migration_id)
        .ok_or_else(|| Error::MalformedIdentifier(migration_id.to_string()))?;

    Ok(format!(
        "{}.{}.{} {}:{}:{}",
        &caps[3], &caps[2], &caps[1], &caps[4], &caps[5], &caps[6]
    ))
}

/// Human label: everything after the timestamp token, underscores as spaces.
pub fn clear_name(migration_id: &str) -> String {
    migration_id
        .split('_')
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `stem` starts with a 14-digit timestamp prefix.
pub fn is_migration_id(stem: &str) -> bool {
    TIMESTAMP_PREFIX.is_match(stem)
}

/// Calendar interpretation of the ID prefix, `None` if it isn't a real date.
pub fn timestamp(migration_id: &str) -> Option<NaiveDateTime> {
    let prefix = migration_id.get(..14)?;
    if !is_migration_id(prefix) {
        return None;
    }
    NaiveDateTime::parse_from_str(prefix, ID_TIMESTAMP_FORMAT).ok()
}

/// Build an ID for a new migration file: `YYYYMMDDHHMMSS_<slug>`.
///
/// The label is lowercased and every run of non-alphanumeric characters
/// becomes a single underscore. An empty slug yields a bare timestamp.
pub fn new_id(now: NaiveDateTime, label: &str) -> String {
    let prefix = now.format(ID_TIMESTAMP_FORMAT).to_string();

    let slug = label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");

    if slug.is_empty() {
        prefix
    } else {
        format!("{prefix}_{slug}")
    }
}
