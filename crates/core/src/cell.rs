use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::query_runner::Record;

static LEADING_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("date pattern is valid"));

static NULL_CELL: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    Null,
    Boolean,
    Number,
    Date,
    String,
}

impl CellType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Date => "date",
            Self::String => "string",
        }
    }
}

/// Looks up a column in a record. Missing columns read as `NULL`.
#[must_use]
pub fn record_cell<'a>(record: &'a Record, column: &str) -> &'a Value {
    record.get(column).unwrap_or(&NULL_CELL)
}

#[must_use]
pub fn cell_type(value: &Value) -> CellType {
    match value {
        Value::Null => CellType::Null,
        Value::Bool(_) => CellType::Boolean,
        Value::Number(_) => CellType::Number,
        Value::String(text) if LEADING_DATE.is_match(text) => CellType::Date,
        Value::String(_) | Value::Array(_) | Value::Object(_) => CellType::String,
    }
}

#[must_use]
pub fn cell_display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
