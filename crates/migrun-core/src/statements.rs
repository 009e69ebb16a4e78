use std::sync::LazyLock;

use regex::Regex;

/// Stored routines keep blank lines and nested terminators, so a block
/// containing one is never split.
static STORED_ROUTINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)CREATE\s+(PROCEDURE|FUNCTION)").expect("valid routine regex")
});

/// A blank (whitespace-only) line between two statements.
static STATEMENT_DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid delimiter regex"));

/// Drop leading and trailing whitespace-only lines, keeping interior ones.
pub fn trim_blank_lines<S: AsRef<str>>(lines: &[S]) -> &[S] {
    let is_blank = |line: &S| line.as_ref().trim().is_empty();

    let Some(start) = lines.iter().position(|l| !is_blank(l)) else {
        return &lines[..0];
    };
    let end = lines.iter().rposition(|l| !is_blank(l)).map_or(start, |i| i + 1);

    &lines[start..end]
}

/// Whether the block text looks like a `CREATE PROCEDURE` / `CREATE FUNCTION`.
///
/// This is a plain text search: a mention inside a comment or string literal
/// also counts.
pub fn is_stored_routine(block: &str) -> bool {
    STORED_ROUTINE.is_match(block)
}

/// Turn one section's accumulated lines into discrete SQL statements.
pub fn extract_statements<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let trimmed = trim_blank_lines(lines);
    if trimmed.is_empty() {
        return Vec::new();
    }

    let block = trimmed
        .iter()
        .map(|line| line.as_ref())
        .collect::<Vec<&str>>()
        .join("\n");

    if is_stored_routine(&block) {
        return vec![block];
    }

    STATEMENT_DELIMITER
        .split(&block)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
