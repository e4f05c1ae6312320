use std::sync::LazyLock;

use regex::Regex;

static FROM_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfrom\s+([^\s,;()]+)").expect("from-clause pattern is valid")
});

const IDENTIFIER_QUOTES: [char; 5] = ['`', '"', '\'', '[', ']'];

/// Best-effort table name: the token after the first `FROM`, without quoting.
#[must_use]
pub fn extract_table_name(statement: &str) -> Option<String> {
    let captures = FROM_TARGET.captures(statement)?;
    let table = captures
        .get(1)?
        .as_str()
        .chars()
        .filter(|ch| !IDENTIFIER_QUOTES.contains(ch))
        .collect::<String>();
    (!table.is_empty()).then_some(table)
}

/// `position` is 1-based.
#[must_use]
pub fn derive_display_name(statement: &str, database: Option<&str>, position: usize) -> String {
    let database = database.map(str::trim).filter(|name| !name.is_empty());
    match (database, extract_table_name(statement)) {
        (Some(database), Some(table)) => format!("{database}.{table}"),
        (Some(database), None) => format!("{database}_{position}"),
        (None, _) => format!("result_{position}"),
    }
}
