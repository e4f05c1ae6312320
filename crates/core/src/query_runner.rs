use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::display_name::derive_display_name;
use crate::pagination::{PageRequest, PaginationInfo};

pub type Record = serde_json::Map<String, Value>;

pub const GENERIC_EXECUTION_ERROR: &str = "Query execution failed";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryBackendError {
    message: String,
}

impl QueryBackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn generic() -> Self {
        Self::new(GENERIC_EXECUTION_ERROR)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResult {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub rows: Vec<Record>,
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub pagination: Option<PaginationInfo>,
}

/// Wire shape of a paginated execution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    Multi {
        queries: Vec<StatementResult>,
    },
    Single {
        rows: Vec<Record>,
        #[serde(default, rename = "totalRows")]
        total_rows: Option<u64>,
    },
}

impl ExecuteResponse {
    /// `null` and `{}` are the backend's way of saying "no result".
    pub fn from_json(value: Value) -> Result<Option<Self>, serde_json::Error> {
        match &value {
            Value::Null => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            _ => {}
        }
        serde_json::from_value(value).map(Some)
    }

    #[must_use]
    pub fn normalize(self, submitted_query: &str, database: Option<&str>) -> NormalizedResponse {
        match self {
            Self::Multi { queries } => NormalizedResponse {
                results: queries
                    .into_iter()
                    .enumerate()
                    .map(|(index, statement)| QueryResult::from_statement(statement, database, index))
                    .collect(),
                tabbed: true,
            },
            Self::Single { rows, total_rows } => {
                let statement = StatementResult {
                    query: submitted_query.to_string(),
                    rows,
                    total_rows,
                    pagination: None,
                };
                NormalizedResponse {
                    results: vec![QueryResult::from_statement(statement, database, 0)],
                    tabbed: false,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub results: Vec<QueryResult>,
    pub tabbed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub query: String,
    pub rows: Vec<Record>,
    pub total_rows: Option<u64>,
    pub pagination: Option<PaginationInfo>,
    pub display_name: String,
}

impl QueryResult {
    fn from_statement(statement: StatementResult, database: Option<&str>, index: usize) -> Self {
        let display_name = derive_display_name(&statement.query, database, index + 1);
        Self {
            query: statement.query,
            rows: statement.rows,
            total_rows: statement.total_rows,
            pagination: statement.pagination,
            display_name,
        }
    }

    /// Columns come from the first row only; an empty result has no columns.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait QueryBackend {
    async fn execute_query(
        &self,
        query: &str,
        database: Option<&str>,
        page: PageRequest,
    ) -> Result<Option<ExecuteResponse>, QueryBackendError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ExecuteResponse, QueryBackendError, GENERIC_EXECUTION_ERROR};

    #[test]
    fn multi_statement_payload_keeps_statement_order() {
        let response = ExecuteResponse::from_json(json!({
            "queries": [
                {"query": "SELECT * FROM users", "rows": [{"id": 1, "name": "ada"}], "totalRows": 1},
                {"query": "SELECT 1", "rows": [], "pagination": {"page": 1, "pageSize": 50, "totalPages": 1}}
            ]
        }))
        .expect("payload should decode")
        .expect("payload is not empty");

        let normalized = response.normalize("ignored", Some("sales"));
        assert!(normalized.tabbed);
        assert_eq!(normalized.results.len(), 2);
        assert_eq!(normalized.results[0].display_name, "sales.users");
        assert_eq!(normalized.results[0].columns(), vec!["id", "name"]);
        assert_eq!(normalized.results[1].display_name, "sales_2");
        assert!(normalized.results[1].columns().is_empty());
        assert_eq!(
            normalized.results[1].pagination.map(|info| info.page_size),
            Some(50)
        );
    }

    #[test]
    fn legacy_payload_becomes_one_untabbed_result() {
        let response = ExecuteResponse::from_json(json!({
            "rows": [{"b": 2, "a": 1}],
            "totalRows": 40
        }))
        .expect("payload should decode")
        .expect("payload is not empty");

        let normalized = response.normalize("SELECT b, a FROM pairs", Some("sales"));
        assert!(!normalized.tabbed);
        assert_eq!(normalized.results.len(), 1);
        assert_eq!(normalized.results[0].total_rows, Some(40));
        assert_eq!(normalized.results[0].columns(), vec!["b", "a"]);
        assert_eq!(normalized.results[0].display_name, "sales.pairs");
    }

    #[test]
    fn null_and_empty_payloads_are_absent() {
        assert!(ExecuteResponse::from_json(json!(null))
            .expect("null decodes")
            .is_none());
        assert!(ExecuteResponse::from_json(json!({}))
            .expect("empty object decodes")
            .is_none());
    }

    #[test]
    fn unrecognized_payload_is_an_error() {
        assert!(ExecuteResponse::from_json(json!({"status": "ok"})).is_err());
    }

    #[test]
    fn generic_error_has_fallback_message() {
        assert_eq!(QueryBackendError::generic().message(), GENERIC_EXECUTION_ERROR);
        assert_eq!(QueryBackendError::new("boom").to_string(), "boom");
    }
}
