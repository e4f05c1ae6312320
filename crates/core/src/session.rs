use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use crate::cell::{cell_display_value, record_cell};
use crate::clipboard::{copy_with_fallback, ClipboardError, ClipboardSink, CopyMethod};
use crate::pagination::{GridPagination, PageRequest};
use crate::query_runner::{ExecuteResponse, QueryBackend, QueryBackendError, QueryResult, Record};
use crate::timers::TransientFlag;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const COPY_INDICATOR_DURATION: Duration = Duration::from_secs(2);

/// Published per tab; carries the display name alongside the result data.
pub type ResultTabSummary = QueryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// A request issued by the session that still awaits its backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExecution {
    pub ticket: RequestTicket,
    pub query: String,
    pub database: Option<String>,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Skipped,
    Applied { results: usize },
    Cleared,
    Stale,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("query execution failed: {0}")]
    Execution(#[source] QueryBackendError),
    #[error("no cell at row {row}, column `{column}`")]
    NoSuchCell { row: usize, column: String },
    #[error("clipboard copy failed: {0}")]
    Clipboard(#[source] ClipboardError),
}

#[derive(Debug)]
pub struct QuerySession {
    query: String,
    database: Option<String>,
    current_page: u32,
    requested_page: u32,
    page_size: u32,
    loading: bool,
    error: Option<String>,
    state: SessionState,
    results: Vec<QueryResult>,
    tabbed: bool,
    active_index: usize,
    rows: Vec<Record>,
    columns: Vec<String>,
    pagination: GridPagination,
    latest_ticket: u64,
    tabs: watch::Sender<Vec<ResultTabSummary>>,
    copied: TransientFlag,
}

impl Default for QuerySession {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl QuerySession {
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        let page_size = page_size.max(1);
        let (tabs, _) = watch::channel(Vec::new());
        Self {
            query: String::new(),
            database: None,
            current_page: 1,
            requested_page: 1,
            page_size,
            loading: false,
            error: None,
            state: SessionState::Idle,
            results: Vec::new(),
            tabbed: false,
            active_index: 0,
            rows: Vec::new(),
            columns: Vec::new(),
            pagination: GridPagination::first_page(page_size),
            latest_ticket: 0,
            tabs,
            copied: TransientFlag::new(),
        }
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// All normalized results, including the implicit one of a legacy response.
    #[must_use]
    pub fn results(&self) -> &[QueryResult] {
        &self.results
    }

    #[must_use]
    pub fn tab_count(&self) -> usize {
        if self.tabbed {
            self.results.len()
        } else {
            0
        }
    }

    #[must_use]
    pub fn tab_summaries(&self) -> Vec<ResultTabSummary> {
        if self.tabbed {
            self.results.clone()
        } else {
            Vec::new()
        }
    }

    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active_index
    }

    #[must_use]
    pub fn active_result(&self) -> Option<&QueryResult> {
        self.results.get(self.active_index)
    }

    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn pagination(&self) -> GridPagination {
        self.pagination
    }

    #[must_use]
    pub fn is_copied(&self) -> bool {
        self.copied.is_raised()
    }

    /// Receives the tab summaries every time the result set changes.
    #[must_use]
    pub fn subscribe_tabs(&self) -> watch::Receiver<Vec<ResultTabSummary>> {
        self.tabs.subscribe()
    }

    /// Records the request in session state. Blank queries issue nothing.
    pub fn begin_execute(
        &mut self,
        query: &str,
        database: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Option<PendingExecution> {
        if query.trim().is_empty() {
            tracing::debug!("ignoring blank query");
            return None;
        }

        let page = PageRequest::new(page, page_size);
        self.query = query.to_string();
        self.database = database.map(str::to_string);
        self.current_page = page.page;
        self.requested_page = page.page;
        self.page_size = page.page_size;
        self.loading = true;
        self.error = None;
        self.state = SessionState::Loading;
        self.latest_ticket += 1;

        tracing::info!(
            database = database.unwrap_or("-"),
            page = page.page,
            page_size = page.page_size,
            "executing query"
        );

        Some(PendingExecution {
            ticket: RequestTicket(self.latest_ticket),
            query: self.query.clone(),
            database: self.database.clone(),
            page,
        })
    }

    pub fn complete_execute(
        &mut self,
        pending: &PendingExecution,
        response: Result<Option<ExecuteResponse>, QueryBackendError>,
    ) -> Result<ExecuteOutcome, SessionError> {
        if pending.ticket != RequestTicket(self.latest_ticket) || !self.loading {
            tracing::warn!(
                ticket = pending.ticket.0,
                latest = self.latest_ticket,
                "discarding stale query response"
            );
            return Ok(ExecuteOutcome::Stale);
        }

        self.loading = false;
        let outcome = match response {
            Ok(Some(response)) => {
                let normalized = response.normalize(&pending.query, pending.database.as_deref());
                self.results = normalized.results;
                self.tabbed = normalized.tabbed;
                if self.active_index >= self.results.len() {
                    self.active_index = 0;
                }
                self.apply_active_result();
                self.state = SessionState::Ready;
                ExecuteOutcome::Applied {
                    results: self.results.len(),
                }
            }
            Ok(None) => {
                self.clear_results();
                self.state = SessionState::Ready;
                ExecuteOutcome::Cleared
            }
            Err(error) => {
                tracing::warn!(%error, "query execution failed");
                self.clear_results();
                self.error = Some(error.message().to_string());
                self.state = SessionState::Error;
                self.publish_tabs();
                return Err(SessionError::Execution(error));
            }
        };

        self.publish_tabs();
        Ok(outcome)
    }

    pub async fn execute<B: QueryBackend>(
        &mut self,
        backend: &B,
        query: &str,
        database: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<ExecuteOutcome, SessionError> {
        let Some(pending) = self.begin_execute(query, database, page, page_size) else {
            return Ok(ExecuteOutcome::Skipped);
        };
        let response = backend
            .execute_query(&pending.query, pending.database.as_deref(), pending.page)
            .await;
        self.complete_execute(&pending, response)
    }

    pub fn set_active_result(&mut self, index: usize) -> bool {
        if index >= self.tab_count() {
            return false;
        }
        self.active_index = index;
        self.apply_active_result();
        true
    }

    pub fn close_result_tab(&mut self, index: usize) -> bool {
        if index >= self.tab_count() {
            return false;
        }

        self.results.remove(index);
        if self.results.is_empty() {
            self.active_index = 0;
            self.clear_grid();
        } else {
            if self.active_index >= self.results.len() {
                self.active_index = self.results.len() - 1;
            }
            self.apply_active_result();
        }

        self.publish_tabs();
        true
    }

    /// Pages are always fetched from the backend, never sliced locally.
    pub fn begin_change_page(&mut self, new_page: u32) -> Option<PendingExecution> {
        if self.query.trim().is_empty()
            || !self
                .pagination
                .accepts_page_change(self.current_page, new_page)
        {
            return None;
        }

        let query = self.query.clone();
        let database = self.database.clone();
        self.begin_execute(&query, database.as_deref(), new_page, self.page_size)
    }

    pub async fn change_page<B: QueryBackend>(
        &mut self,
        backend: &B,
        new_page: u32,
    ) -> Result<ExecuteOutcome, SessionError> {
        let Some(pending) = self.begin_change_page(new_page) else {
            return Ok(ExecuteOutcome::Skipped);
        };
        let response = backend
            .execute_query(&pending.query, pending.database.as_deref(), pending.page)
            .await;
        self.complete_execute(&pending, response)
    }

    /// Tab or database switch: drop everything and ignore in-flight responses.
    pub fn reset(&mut self) {
        tracing::debug!("resetting query session");
        self.latest_ticket += 1;
        self.query.clear();
        self.database = None;
        self.current_page = 1;
        self.requested_page = 1;
        self.loading = false;
        self.error = None;
        self.state = SessionState::Idle;
        self.clear_results();
        self.copied.clear();
        self.publish_tabs();
    }

    pub fn copy_cell(
        &mut self,
        row: usize,
        column: &str,
        primary: &mut dyn ClipboardSink,
        fallback: &mut dyn ClipboardSink,
    ) -> Result<CopyMethod, SessionError> {
        let record = self
            .rows
            .get(row)
            .filter(|_| self.columns.iter().any(|name| name == column))
            .ok_or_else(|| SessionError::NoSuchCell {
                row,
                column: column.to_string(),
            })?;
        let text = cell_display_value(record_cell(record, column));

        let method =
            copy_with_fallback(primary, fallback, &text).map_err(SessionError::Clipboard)?;
        self.copied.raise_for(COPY_INDICATOR_DURATION);
        Ok(method)
    }

    fn apply_active_result(&mut self) {
        let Some(result) = self.results.get(self.active_index) else {
            self.clear_grid();
            return;
        };

        self.rows = result.rows.clone();
        self.columns = result.columns();
        self.pagination = GridPagination::derive(
            result.pagination,
            result.total_rows,
            result.rows.len(),
            PageRequest::new(self.requested_page, self.page_size),
        );
        self.current_page = self.pagination.page;
    }

    fn clear_results(&mut self) {
        self.results.clear();
        self.tabbed = false;
        self.active_index = 0;
        self.clear_grid();
    }

    fn clear_grid(&mut self) {
        self.rows.clear();
        self.columns.clear();
        self.current_page = 1;
        self.pagination = GridPagination::first_page(self.page_size);
    }

    fn publish_tabs(&self) {
        self.tabs.send_replace(self.tab_summaries());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::{ExecuteOutcome, QuerySession, SessionError, SessionState};
    use crate::clipboard::tests::RecordingClipboard;
    use crate::clipboard::CopyMethod;
    use crate::pagination::PageRequest;
    use crate::query_runner::{ExecuteResponse, QueryBackend, QueryBackendError};

    type Reply = Result<Option<ExecuteResponse>, QueryBackendError>;

    #[derive(Debug, Default)]
    struct FakeBackend {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<(String, Option<String>, PageRequest)>>,
    }

    impl FakeBackend {
        fn with_replies(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                calls: Mutex::default(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("calls lock").len()
        }

        fn last_page(&self) -> Option<PageRequest> {
            self.calls
                .lock()
                .expect("calls lock")
                .last()
                .map(|(_, _, page)| *page)
        }
    }

    #[async_trait::async_trait]
    impl QueryBackend for FakeBackend {
        async fn execute_query(
            &self,
            query: &str,
            database: Option<&str>,
            page: PageRequest,
        ) -> Result<Option<ExecuteResponse>, QueryBackendError> {
            self.calls.lock().expect("calls lock").push((
                query.to_string(),
                database.map(str::to_string),
                page,
            ));
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    fn response(value: Value) -> Reply {
        Ok(ExecuteResponse::from_json(value).expect("test payload should decode"))
    }

    fn three_statements() -> Reply {
        response(json!({
            "queries": [
                {"query": "SELECT * FROM Users", "rows": [{"id": 1, "name": "ada"}], "totalRows": 1},
                {"query": "SELECT 1", "rows": [{"one": 1}]},
                {"query": "SELECT * FROM orders", "rows": [], "totalRows": 0}
            ]
        }))
    }

    fn paged_single(total_rows: u64) -> Reply {
        response(json!({"rows": [{"id": 1}], "totalRows": total_rows}))
    }

    #[tokio::test]
    async fn blank_query_issues_no_request() {
        let backend = FakeBackend::default();
        let mut session = QuerySession::new(50);

        let outcome = session
            .execute(&backend, "   \n", Some("sales"), 1, 50)
            .await
            .expect("blank query is not an error");

        assert_eq!(outcome, ExecuteOutcome::Skipped);
        assert_eq!(backend.call_count(), 0);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.query().is_empty());
    }

    #[tokio::test]
    async fn multi_statement_response_creates_one_tab_per_statement() {
        let backend = FakeBackend::with_replies(vec![three_statements()]);
        let mut session = QuerySession::new(50);
        let tabs = session.subscribe_tabs();

        let outcome = session
            .execute(&backend, "SELECT * FROM Users; SELECT 1; SELECT * FROM orders", Some("sales"), 1, 50)
            .await
            .expect("execution should succeed");

        assert_eq!(outcome, ExecuteOutcome::Applied { results: 3 });
        assert_eq!(session.tab_count(), 3);
        assert!(session.active_index() < session.tab_count());
        assert_eq!(session.state(), SessionState::Ready);
        assert!(!session.is_loading());
        assert_eq!(session.columns(), ["id", "name"]);
        assert_eq!(session.rows().len(), 1);

        let names = tabs
            .borrow()
            .iter()
            .map(|tab| tab.display_name.clone())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["sales.Users", "sales_2", "sales.orders"]);
    }

    #[tokio::test]
    async fn legacy_response_hides_the_tab_strip() {
        let backend = FakeBackend::with_replies(vec![paged_single(230)]);
        let mut session = QuerySession::new(100);
        let tabs = session.subscribe_tabs();

        session
            .execute(&backend, "SELECT id FROM events", Some("app"), 1, 100)
            .await
            .expect("execution should succeed");

        assert_eq!(session.tab_count(), 0);
        assert!(tabs.borrow().is_empty());
        assert_eq!(session.results().len(), 1);
        assert_eq!(session.columns(), ["id"]);
        assert_eq!(session.pagination().total_rows, 230);
        assert_eq!(session.pagination().total_pages, 3);
        assert!(!session.set_active_result(0));
        assert!(!session.close_result_tab(0));
    }

    #[tokio::test]
    async fn empty_response_clears_grid_to_single_page() {
        let backend = FakeBackend::with_replies(vec![three_statements(), Ok(None)]);
        let mut session = QuerySession::new(50);

        session
            .execute(&backend, "SELECT * FROM Users", Some("sales"), 1, 50)
            .await
            .expect("first execution should succeed");
        let outcome = session
            .execute(&backend, "DELETE FROM Users", Some("sales"), 1, 50)
            .await
            .expect("second execution should succeed");

        assert_eq!(outcome, ExecuteOutcome::Cleared);
        assert!(session.rows().is_empty());
        assert!(session.columns().is_empty());
        assert!(session.results().is_empty());
        assert_eq!(session.pagination().page, 1);
        assert_eq!(session.pagination().total_pages, 1);
    }

    #[tokio::test]
    async fn transport_error_clears_state_and_ends_loading() {
        let backend = FakeBackend::with_replies(vec![
            three_statements(),
            Err(QueryBackendError::new("relation \"nope\" does not exist")),
        ]);
        let mut session = QuerySession::new(50);
        let tabs = session.subscribe_tabs();

        session
            .execute(&backend, "SELECT * FROM Users", Some("sales"), 1, 50)
            .await
            .expect("first execution should succeed");
        let error = session
            .execute(&backend, "SELECT * FROM nope", Some("sales"), 1, 50)
            .await
            .expect_err("second execution should fail");

        assert!(matches!(error, SessionError::Execution(_)));
        assert!(session.rows().is_empty());
        assert!(session.columns().is_empty());
        assert!(session.results().is_empty());
        assert!(!session.is_loading());
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.error(), Some("relation \"nope\" does not exist"));
        assert!(tabs.borrow().is_empty());
    }

    #[tokio::test]
    async fn next_execute_clears_previous_error() {
        let backend = FakeBackend::with_replies(vec![
            Err(QueryBackendError::generic()),
            paged_single(1),
        ]);
        let mut session = QuerySession::new(50);

        let _ = session
            .execute(&backend, "SELECT 1", None, 1, 50)
            .await
            .expect_err("first execution should fail");
        session
            .execute(&backend, "SELECT 1", None, 1, 50)
            .await
            .expect("second execution should succeed");

        assert_eq!(session.error(), None);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn selecting_a_tab_applies_its_rows_and_pagination() {
        let backend = FakeBackend::with_replies(vec![response(json!({
            "queries": [
                {"query": "SELECT * FROM a", "rows": [{"x": 1}]},
                {"query": "SELECT * FROM b", "rows": [{"y": 2}, {"y": 3}],
                 "pagination": {"page": 2, "pageSize": 2, "totalPages": 5}}
            ]
        }))]);
        let mut session = QuerySession::new(50);
        session
            .execute(&backend, "SELECT * FROM a; SELECT * FROM b", Some("db"), 1, 50)
            .await
            .expect("execution should succeed");

        assert!(!session.set_active_result(2));
        assert_eq!(session.active_index(), 0);

        assert!(session.set_active_result(1));
        assert_eq!(session.columns(), ["y"]);
        assert_eq!(session.rows().len(), 2);
        let pagination = session.pagination();
        assert_eq!(pagination.page, 2);
        assert_eq!(pagination.page_size, 2);
        assert_eq!(pagination.total_pages, 5);
        assert_eq!(pagination.total_rows, 2);
        assert_eq!(session.current_page(), 2);

        assert!(session.set_active_result(0));
        let pagination = session.pagination();
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.page_size, 50);
        assert_eq!(pagination.total_pages, 1);
        assert_eq!(session.current_page(), 1);
        assert_eq!(session.columns(), ["x"]);
    }

    #[tokio::test]
    async fn closing_active_last_tab_moves_to_new_last() {
        let backend = FakeBackend::with_replies(vec![three_statements()]);
        let mut session = QuerySession::new(50);
        session
            .execute(&backend, "SELECT * FROM Users", Some("sales"), 1, 50)
            .await
            .expect("execution should succeed");

        assert!(session.set_active_result(2));
        assert!(session.close_result_tab(2));
        assert_eq!(session.tab_count(), 2);
        assert_eq!(session.active_index(), 1);
        assert_eq!(session.columns(), ["one"]);
    }

    #[tokio::test]
    async fn closing_active_middle_tab_keeps_position() {
        let backend = FakeBackend::with_replies(vec![three_statements()]);
        let mut session = QuerySession::new(50);
        let tabs = session.subscribe_tabs();
        session
            .execute(&backend, "SELECT * FROM Users", Some("sales"), 1, 50)
            .await
            .expect("execution should succeed");

        assert!(session.set_active_result(1));
        assert!(session.close_result_tab(1));
        assert_eq!(session.active_index(), 1);
        assert_eq!(tabs.borrow().len(), 2);
        assert_eq!(tabs.borrow()[1].display_name, "sales.orders");
        assert!(session.columns().is_empty());
    }

    #[tokio::test]
    async fn closing_every_tab_clears_the_grid() {
        let backend = FakeBackend::with_replies(vec![three_statements()]);
        let mut session = QuerySession::new(50);
        session
            .execute(&backend, "SELECT * FROM Users", Some("sales"), 1, 50)
            .await
            .expect("execution should succeed");

        assert!(!session.close_result_tab(3));
        while session.tab_count() > 0 {
            assert!(session.close_result_tab(0));
        }

        assert_eq!(session.active_index(), 0);
        assert!(session.rows().is_empty());
        assert!(session.columns().is_empty());
        assert_eq!(session.pagination().total_pages, 1);
    }

    #[tokio::test]
    async fn change_page_ignores_out_of_range_and_current_page() {
        let backend = FakeBackend::with_replies(vec![paged_single(30)]);
        let mut session = QuerySession::new(10);
        session
            .execute(&backend, "SELECT id FROM events", Some("app"), 1, 10)
            .await
            .expect("execution should succeed");
        assert_eq!(session.pagination().total_pages, 3);

        for page in [0, 1, 4] {
            let outcome = session
                .change_page(&backend, page)
                .await
                .expect("no-op page change is not an error");
            assert_eq!(outcome, ExecuteOutcome::Skipped);
        }
        assert_eq!(backend.call_count(), 1);
        assert_eq!(session.current_page(), 1);
    }

    #[tokio::test]
    async fn change_page_refetches_from_backend() {
        let backend = FakeBackend::with_replies(vec![paged_single(30), paged_single(30)]);
        let mut session = QuerySession::new(10);
        session
            .execute(&backend, "SELECT id FROM events", Some("app"), 1, 10)
            .await
            .expect("execution should succeed");

        let outcome = session
            .change_page(&backend, 3)
            .await
            .expect("page change should succeed");

        assert_eq!(outcome, ExecuteOutcome::Applied { results: 1 });
        assert_eq!(backend.call_count(), 2);
        assert_eq!(backend.last_page(), Some(PageRequest::new(3, 10)));
        assert_eq!(session.current_page(), 3);
        assert_eq!(session.pagination().page, 3);
    }

    #[tokio::test]
    async fn only_the_latest_request_is_applied() {
        let mut session = QuerySession::new(10);
        let first = session
            .begin_execute("SELECT * FROM a", Some("db"), 1, 10)
            .expect("first request issued");
        let second = session
            .begin_execute("SELECT * FROM b", Some("db"), 1, 10)
            .expect("second request issued");

        let outcome = session
            .complete_execute(&first, paged_single(1))
            .expect("stale completion is not an error");
        assert_eq!(outcome, ExecuteOutcome::Stale);
        assert!(session.is_loading());
        assert!(session.rows().is_empty());

        let outcome = session
            .complete_execute(&second, paged_single(1))
            .expect("latest completion applies");
        assert_eq!(outcome, ExecuteOutcome::Applied { results: 1 });
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn reset_returns_to_idle_and_drops_in_flight_responses() {
        let backend = FakeBackend::with_replies(vec![three_statements()]);
        let mut session = QuerySession::new(50);
        let tabs = session.subscribe_tabs();
        session
            .execute(&backend, "SELECT * FROM Users", Some("sales"), 1, 50)
            .await
            .expect("execution should succeed");
        let pending = session
            .begin_execute("SELECT * FROM Users", Some("sales"), 1, 50)
            .expect("request issued");

        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_loading());
        assert!(session.results().is_empty());
        assert!(session.database().is_none());
        assert!(tabs.borrow().is_empty());

        let outcome = session
            .complete_execute(&pending, three_statements())
            .expect("stale completion is not an error");
        assert_eq!(outcome, ExecuteOutcome::Stale);
        assert!(session.results().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn copying_a_cell_raises_a_transient_indicator() {
        let backend = FakeBackend::with_replies(vec![three_statements()]);
        let mut session = QuerySession::new(50);
        session
            .execute(&backend, "SELECT * FROM Users", Some("sales"), 1, 50)
            .await
            .expect("execution should succeed");

        let mut primary = RecordingClipboard::failing();
        let mut fallback = RecordingClipboard::default();
        let method = session
            .copy_cell(0, "name", &mut primary, &mut fallback)
            .expect("copy should succeed");

        assert_eq!(method, CopyMethod::Fallback);
        assert_eq!(fallback.copied, vec!["ada"]);
        assert!(session.is_copied());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!session.is_copied());
    }

    #[tokio::test]
    async fn copying_outside_the_grid_fails() {
        let mut session = QuerySession::new(50);
        let mut primary = RecordingClipboard::default();
        let mut fallback = RecordingClipboard::default();

        let error = session
            .copy_cell(0, "id", &mut primary, &mut fallback)
            .expect_err("empty grid has no cells");
        assert!(matches!(error, SessionError::NoSuchCell { row: 0, .. }));
        assert!(!session.is_copied());
    }
}
