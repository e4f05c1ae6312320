use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::style::Print;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use dbfuse_adapters::clipboard::SystemClipboard;
use dbfuse_core::cell::{cell_display_value, cell_type, record_cell, CellType};
use dbfuse_core::clipboard::{ClipboardError, ClipboardSink, CopyMethod};
use dbfuse_core::config::{ClientConfig, SavedConnection};
use dbfuse_core::query_runner::{ExecuteResponse, QueryBackend, QueryBackendError};
use dbfuse_core::session::{
    ExecuteOutcome, PendingExecution, QuerySession, ResultTabSummary, SessionError, SessionState,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use ratatui::{Frame, Terminal};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};

const TICK_RATE: Duration = Duration::from_millis(120);
const DEFAULT_QUERY: &str = "SELECT * FROM users";
const MIN_COLUMN_WIDTH: u16 = 10;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct TuiOptions {
    pub config: ClientConfig,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Editor,
    Results,
}

impl Focus {
    fn toggle(self) -> Self {
        match self {
            Self::Editor => Self::Results,
            Self::Results => Self::Editor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    ToggleFocus,
    Submit,
    Input(char),
    Backspace,
    Navigate(DirectionKey),
    PreviousTab,
    NextTab,
    CloseTab,
    PreviousPage,
    NextPage,
    CopyCell,
    CycleDatabase,
}

#[derive(Debug)]
struct Completion {
    pending: PendingExecution,
    response: Result<Option<ExecuteResponse>, QueryBackendError>,
}

struct Osc52Clipboard;

impl ClipboardSink for Osc52Clipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        write_osc52(&mut io::stdout(), text)
            .map_err(|error| ClipboardError::new(format!("terminal clipboard: {error}")))
    }
}

fn write_osc52<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
    let encoded = BASE64.encode(text);
    execute!(writer, Print(format!("\x1b]52;c;{encoded}\x07")))
}

struct TuiApp {
    session: QuerySession,
    tabs: watch::Receiver<Vec<ResultTabSummary>>,
    focus: Focus,
    editor_text: String,
    connections: Vec<SavedConnection>,
    connection_index: Option<usize>,
    database: Option<String>,
    page_size: u32,
    cursor_row: usize,
    cursor_column: usize,
    show_help: bool,
    should_quit: bool,
    status_line: String,
    outbox: Vec<PendingExecution>,
    primary_clipboard: Box<dyn ClipboardSink>,
    fallback_clipboard: Box<dyn ClipboardSink>,
}

impl TuiApp {
    fn new(
        config: &ClientConfig,
        database: Option<String>,
        primary_clipboard: Box<dyn ClipboardSink>,
        fallback_clipboard: Box<dyn ClipboardSink>,
    ) -> Self {
        let session = QuerySession::new(config.page_size);
        let tabs = session.subscribe_tabs();
        let connections = config.saved_connections.clone();
        let connection_index = match &database {
            Some(name) => connections
                .iter()
                .position(|connection| &connection.database == name),
            None => (!connections.is_empty()).then_some(0),
        };
        let database = database.or_else(|| {
            connection_index
                .and_then(|index| connections.get(index))
                .map(|connection| connection.database.clone())
        });

        Self {
            session,
            tabs,
            focus: Focus::Editor,
            editor_text: DEFAULT_QUERY.to_string(),
            connections,
            connection_index,
            database,
            page_size: config.page_size,
            cursor_row: 0,
            cursor_column: 0,
            show_help: false,
            should_quit: false,
            status_line: "Type a query and press Enter to run it".to_string(),
            outbox: Vec::new(),
            primary_clipboard,
            fallback_clipboard,
        }
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::ToggleFocus => {
                self.focus = self.focus.toggle();
                self.status_line = format!("Focus: {}", self.focus_name());
            }
            Msg::Submit => self.submit(),
            Msg::Input(ch) => self.editor_text.push(ch),
            Msg::Backspace => {
                self.editor_text.pop();
            }
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::PreviousTab => self.select_tab_offset(-1),
            Msg::NextTab => self.select_tab_offset(1),
            Msg::CloseTab => {
                let index = self.session.active_index();
                if self.session.close_result_tab(index) {
                    self.clamp_cursor();
                    self.status_line = format!("Closed result tab {}", index + 1);
                } else {
                    self.status_line = "No result tab to close".to_string();
                }
            }
            Msg::PreviousPage => self.change_page(self.session.current_page().saturating_sub(1)),
            Msg::NextPage => self.change_page(self.session.current_page().saturating_add(1)),
            Msg::CopyCell => self.copy_cell(),
            Msg::CycleDatabase => self.cycle_database(),
        }
    }

    fn submit(&mut self) {
        let query = self.editor_text.clone();
        match self
            .session
            .begin_execute(&query, self.database.as_deref(), 1, self.page_size)
        {
            Some(pending) => {
                self.outbox.push(pending);
                self.focus = Focus::Results;
                self.status_line = "Running query...".to_string();
            }
            None => self.status_line = "Query is empty".to_string(),
        }
    }

    fn change_page(&mut self, page: u32) {
        match self.session.begin_change_page(page) {
            Some(pending) => {
                self.status_line = format!("Loading page {page}...");
                self.outbox.push(pending);
            }
            None => self.status_line = format!("Page {page} is not available"),
        }
    }

    fn select_tab_offset(&mut self, offset: isize) {
        let count = self.session.tab_count();
        if count == 0 {
            self.status_line = "No result tabs".to_string();
            return;
        }

        let current = self.session.active_index();
        let next = match offset {
            o if o < 0 => current.checked_sub(1).unwrap_or(count - 1),
            _ => (current + 1) % count,
        };
        if self.session.set_active_result(next) {
            self.clamp_cursor();
            if let Some(result) = self.session.active_result() {
                self.status_line = format!("Result tab: {}", result.display_name);
            }
        }
    }

    fn navigate(&mut self, direction: DirectionKey) {
        let row_count = self.session.rows().len();
        let column_count = self.session.columns().len();
        if row_count == 0 || column_count == 0 {
            self.status_line = "No rows to navigate".to_string();
            return;
        }

        match direction {
            DirectionKey::Up => self.cursor_row = self.cursor_row.saturating_sub(1),
            DirectionKey::Down => self.cursor_row = (self.cursor_row + 1).min(row_count - 1),
            DirectionKey::Left => self.cursor_column = self.cursor_column.saturating_sub(1),
            DirectionKey::Right => {
                self.cursor_column = (self.cursor_column + 1).min(column_count - 1);
            }
        }
    }

    fn copy_cell(&mut self) {
        let Some(column) = self.session.columns().get(self.cursor_column).cloned() else {
            self.status_line = "No cell selected".to_string();
            return;
        };

        let result = self.session.copy_cell(
            self.cursor_row,
            &column,
            self.primary_clipboard.as_mut(),
            self.fallback_clipboard.as_mut(),
        );
        self.status_line = match result {
            Ok(CopyMethod::Primary) => format!("Copied `{column}`"),
            Ok(CopyMethod::Fallback) => format!("Copied `{column}` via terminal"),
            Err(error) => error.to_string(),
        };
    }

    fn cycle_database(&mut self) {
        if self.connections.is_empty() {
            self.status_line = "No saved connections".to_string();
            return;
        }

        let next = self
            .connection_index
            .map_or(0, |index| (index + 1) % self.connections.len());
        self.connection_index = Some(next);
        let connection = &self.connections[next];
        self.database = Some(connection.database.clone());
        self.status_line = format!("Switched to `{}` ({})", connection.name, connection.database);

        self.session.reset();
        self.cursor_row = 0;
        self.cursor_column = 0;
    }

    fn take_outbox(&mut self) -> Vec<PendingExecution> {
        std::mem::take(&mut self.outbox)
    }

    fn apply_completion(&mut self, completion: Completion) {
        let outcome = self
            .session
            .complete_execute(&completion.pending, completion.response);
        match outcome {
            Ok(ExecuteOutcome::Applied { results }) => {
                self.status_line = if self.session.tab_count() > 0 {
                    format!("Loaded {results} result tab(s)")
                } else {
                    format!("Loaded {} row(s)", self.session.rows().len())
                };
            }
            Ok(ExecuteOutcome::Cleared) => {
                self.status_line = "Query returned no result".to_string();
            }
            Ok(ExecuteOutcome::Stale | ExecuteOutcome::Skipped) => return,
            Err(SessionError::Execution(error)) => {
                self.status_line = format!("Query execution failed: {error}");
            }
            Err(error) => self.status_line = error.to_string(),
        }
        self.clamp_cursor();
    }

    fn clamp_cursor(&mut self) {
        self.cursor_row = self
            .cursor_row
            .min(self.session.rows().len().saturating_sub(1));
        self.cursor_column = self
            .cursor_column
            .min(self.session.columns().len().saturating_sub(1));
    }

    fn focus_name(&self) -> &'static str {
        match self.focus {
            Focus::Editor => "Query Editor",
            Focus::Results => "Results",
        }
    }

    fn state_name(&self) -> &'static str {
        match self.session.state() {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Error => "error",
        }
    }
}

pub fn run<B>(options: TuiOptions, backend: B) -> Result<(), TuiError>
where
    B: QueryBackend + Send + Sync + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(TuiError::Runtime)?;
    let backend = Arc::new(backend);

    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &runtime, &backend, &options);
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<B>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    runtime: &Runtime,
    backend: &Arc<B>,
    options: &TuiOptions,
) -> Result<(), TuiError>
where
    B: QueryBackend + Send + Sync + 'static,
{
    // Session timers are spawned on the ambient runtime.
    let _runtime_guard = runtime.enter();
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel::<Completion>();
    let mut app = TuiApp::new(
        &options.config,
        options.database.clone(),
        Box::new(SystemClipboard::new()),
        Box::new(Osc52Clipboard),
    );

    loop {
        for pending in app.take_outbox() {
            let backend = Arc::clone(backend);
            let completion_tx = completion_tx.clone();
            runtime.spawn(async move {
                let response = backend
                    .execute_query(&pending.query, pending.database.as_deref(), pending.page)
                    .await;
                if completion_tx.send(Completion { pending, response }).is_err() {
                    tracing::debug!("ui loop closed before query completed");
                }
            });
        }

        while let Ok(completion) = completion_rx.try_recv() {
            app.apply_completion(completion);
        }

        terminal.draw(|frame| render(frame, &app))?;

        if event::poll(TICK_RATE)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key, app.focus) {
                        app.handle(message);
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn render(frame: &mut Frame<'_>, app: &TuiApp) {
    let tabs = app.tabs.borrow().clone();
    let tab_height = if tabs.is_empty() { 0 } else { 3 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(tab_height),
            Constraint::Min(6),
            Constraint::Length(4),
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" Focus: {} ", app.focus_name()),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("DB: {}", app.database.as_deref().unwrap_or("-"))),
        Span::raw(" | "),
        Span::raw(format!("Session: {}", app.state_name())),
        Span::raw(" | "),
        Span::raw(if app.session.is_loading() {
            "Loading..."
        } else {
            "Idle"
        }),
    ]))
    .block(Block::default().borders(Borders::ALL).title("dbfuse"));
    frame.render_widget(header, chunks[0]);

    let editor_style = if app.focus == Focus::Editor {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let editor = Paragraph::new(app.editor_text.as_str())
        .style(editor_style)
        .block(Block::default().borders(Borders::ALL).title("Query"));
    frame.render_widget(editor, chunks[1]);

    if !tabs.is_empty() {
        let titles = tabs
            .iter()
            .map(|tab| Line::from(tab.display_name.clone()))
            .collect::<Vec<_>>();
        let strip = Tabs::new(titles)
            .select(app.session.active_index())
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
            .block(Block::default().borders(Borders::ALL).title("Results"));
        frame.render_widget(strip, chunks[2]);
    }

    render_grid(frame, app, chunks[3]);

    let pagination = app.session.pagination();
    let mut status = vec![Span::raw(format!(
        "Page {}/{} | {} row(s) total",
        pagination.page, pagination.total_pages, pagination.total_rows
    ))];
    if app.session.is_copied() {
        status.push(Span::raw(" | "));
        status.push(Span::styled("Copied!", Style::default().fg(Color::Green)));
    }
    let mut footer_lines = vec![Line::from(status)];
    match app.session.error() {
        Some(error) => footer_lines.push(Line::from(Span::styled(
            format!("Query execution failed: {error}"),
            Style::default().fg(Color::Red),
        ))),
        None => footer_lines.push(Line::from(format!("Status: {}", app.status_line))),
    }
    let footer = Paragraph::new(footer_lines)
        .block(Block::default().borders(Borders::ALL).title("Pagination"));
    frame.render_widget(footer, chunks[4]);

    if app.show_help {
        render_help_popup(frame);
    }
}

fn render_grid(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let columns = app.session.columns();
    let rows = app.session.rows();
    let block = Block::default().borders(Borders::ALL).title("Grid");

    if columns.is_empty() {
        let empty = Paragraph::new("No rows")
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let visible_limit = usize::from(area.height.saturating_sub(3)).max(1);
    let window_start = app.cursor_row.saturating_sub(visible_limit / 2);
    let body = rows
        .iter()
        .enumerate()
        .skip(window_start)
        .take(visible_limit)
        .map(|(row_index, record)| {
            let cells = columns.iter().enumerate().map(|(column_index, column)| {
                let value = record_cell(record, column);
                let mut style = cell_style(cell_type(value));
                if row_index == app.cursor_row && column_index == app.cursor_column {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                Cell::from(cell_display_value(value)).style(style)
            });
            Row::new(cells)
        })
        .collect::<Vec<_>>();

    let header = Row::new(columns.iter().map(|column| Cell::from(column.as_str())))
        .style(Style::default().add_modifier(Modifier::BOLD));
    let widths = vec![Constraint::Min(MIN_COLUMN_WIDTH); columns.len()];
    let table = Table::new(body, widths).header(header).block(block);
    frame.render_widget(table, area);
}

fn cell_style(kind: CellType) -> Style {
    match kind {
        CellType::Null => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
        CellType::Boolean => Style::default().fg(Color::Yellow),
        CellType::Number => Style::default().fg(Color::Cyan),
        CellType::Date => Style::default().fg(Color::Magenta),
        CellType::String => Style::default(),
    }
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Global keymap"),
        Line::from("Tab: switch between editor and results"),
        Line::from("Enter (editor): run query"),
        Line::from("Ctrl+C: quit"),
        Line::from(""),
        Line::from("Results keymap"),
        Line::from("q: quit, ?: toggle help"),
        Line::from("[ / ]: previous / next result tab"),
        Line::from("x: close result tab"),
        Line::from("p / n: previous / next page"),
        Line::from("Arrows or hjkl: move cell cursor"),
        Line::from("y: copy cell"),
        Line::from("d: switch saved connection"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(key: KeyEvent, focus: Focus) -> Option<Msg> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => return Some(Msg::Quit),
        (_, KeyCode::Tab) => return Some(Msg::ToggleFocus),
        _ => {}
    }

    match focus {
        Focus::Editor => match key.code {
            KeyCode::Enter => Some(Msg::Submit),
            KeyCode::Backspace => Some(Msg::Backspace),
            KeyCode::Esc => Some(Msg::ToggleFocus),
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Msg::Input(ch))
            }
            _ => None,
        },
        Focus::Results => match key.code {
            KeyCode::Char('q') => Some(Msg::Quit),
            KeyCode::Char('?') => Some(Msg::ToggleHelp),
            KeyCode::Enter => Some(Msg::Submit),
            KeyCode::Char('[') => Some(Msg::PreviousTab),
            KeyCode::Char(']') => Some(Msg::NextTab),
            KeyCode::Char('x') => Some(Msg::CloseTab),
            KeyCode::Char('p') | KeyCode::PageUp => Some(Msg::PreviousPage),
            KeyCode::Char('n') | KeyCode::PageDown => Some(Msg::NextPage),
            KeyCode::Char('y') => Some(Msg::CopyCell),
            KeyCode::Char('d') => Some(Msg::CycleDatabase),
            KeyCode::Up | KeyCode::Char('k') => Some(Msg::Navigate(DirectionKey::Up)),
            KeyCode::Down | KeyCode::Char('j') => Some(Msg::Navigate(DirectionKey::Down)),
            KeyCode::Left | KeyCode::Char('h') => Some(Msg::Navigate(DirectionKey::Left)),
            KeyCode::Right | KeyCode::Char('l') => Some(Msg::Navigate(DirectionKey::Right)),
            _ => None,
        },
    }
}
