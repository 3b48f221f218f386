use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rust_decimal::Decimal;
use std::io;

use wealth_ledger::{AccountSummary, EntryType, HistoryView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Accounts,
    History,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Accounts => Page::History,
            Page::History => Page::Accounts,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Accounts => "Accounts",
            Page::History => "History",
        }
    }
}

pub struct App {
    pub accounts: Vec<AccountSummary>,
    pub history: Vec<HistoryView>,
    pub filtered_history: Vec<HistoryView>,
    pub total_wealth: Decimal,
    pub current_page: Page,
    pub accounts_state: TableState,
    pub history_state: TableState,
    pub show_detail: bool,
    /// Entry type filter on the history page
    pub type_filter: Option<EntryType>,
    /// Account filter on the history page (set with Enter on the accounts page)
    pub account_filter: Option<i64>,
}

impl App {
    pub fn new(accounts: Vec<AccountSummary>, history: Vec<HistoryView>, total_wealth: Decimal) -> Self {
        let mut accounts_state = TableState::default();
        if !accounts.is_empty() {
            accounts_state.select(Some(0));
        }

        let mut app = Self {
            accounts,
            filtered_history: history.clone(),
            history,
            total_wealth,
            current_page: Page::Accounts,
            accounts_state,
            history_state: TableState::default(),
            show_detail: false,
            type_filter: None,
            account_filter: None,
        };
        app.refilter();
        app
    }

    fn refilter(&mut self) {
        self.filtered_history = self
            .history
            .iter()
            .filter(|row| self.type_filter.map_or(true, |t| row.entry.entry_type == t))
            .filter(|row| self.account_filter.map_or(true, |id| row.entry.account_id == id))
            .cloned()
            .collect();

        let selected = if self.filtered_history.is_empty() { None } else { Some(0) };
        self.history_state.select(selected);
    }

    pub fn set_type_filter(&mut self, filter: Option<EntryType>) {
        self.type_filter = filter;
        self.refilter();
    }

    /// Jump to the history of the selected account.
    pub fn open_selected_account(&mut self) {
        if let Some(summary) = self.selected_account() {
            self.account_filter = Some(summary.account.id);
            self.current_page = Page::History;
            self.refilter();
        }
    }

    pub fn clear_filters(&mut self) {
        self.type_filter = None;
        self.account_filter = None;
        self.refilter();
    }

    pub fn selected_account(&self) -> Option<&AccountSummary> {
        self.accounts_state.selected().and_then(|i| self.accounts.get(i))
    }

    pub fn selected_entry(&self) -> Option<&HistoryView> {
        self.history_state.selected().and_then(|i| self.filtered_history.get(i))
    }

    fn active_len(&self) -> usize {
        match self.current_page {
            Page::Accounts => self.accounts.len(),
            Page::History => self.filtered_history.len(),
        }
    }

    fn active_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::Accounts => &mut self.accounts_state,
            Page::History => &mut self.history_state,
        }
    }

    pub fn move_by(&mut self, delta: isize) {
        let len = self.active_len();
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let current = state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        state.select(Some(next as usize));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                KeyCode::Tab => app.current_page = app.current_page.next(),
                KeyCode::Enter if app.current_page == Page::Accounts => app.open_selected_account(),
                KeyCode::Enter => app.show_detail = !app.show_detail,
                KeyCode::Char('c') => app.clear_filters(),
                KeyCode::Char(ch @ '1'..='6') if app.current_page == Page::History => {
                    let idx = ch as usize - '1' as usize;
                    app.set_type_filter(Some(EntryType::ALL[idx]));
                }
                KeyCode::Char('0') if app.current_page == Page::History => app.set_type_filter(None),
                KeyCode::Down | KeyCode::Char('j') => app.move_by(1),
                KeyCode::Up | KeyCode::Char('k') => app.move_by(-1),
                KeyCode::PageDown => app.move_by(20),
                KeyCode::PageUp => app.move_by(-20),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Accounts => render_accounts(f, chunks[1], app),
        Page::History if app.show_detail => {
            let content = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
                .split(chunks[1]);
            render_history(f, content[0], app);
            render_detail_panel(f, content[1], app);
        }
        Page::History => render_history(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn amount_color(amount: Decimal) -> Color {
    if amount > Decimal::ZERO {
        Color::Green
    } else if amount < Decimal::ZERO {
        Color::Red
    } else {
        Color::DarkGray
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];
    for (i, page) in [Page::Accounts, Page::History].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    let active = app.accounts.iter().filter(|a| a.account.is_active).count();
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Active: {}/{}", active, app.accounts.len()),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Total wealth: {:.2}", app.total_wealth),
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    ));

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    Row::new(titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1)
}

fn render_accounts(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.accounts.iter().map(|s| {
        let status = if s.account.is_active {
            Cell::from("active").style(Style::default().fg(Color::Green))
        } else {
            Cell::from("closed").style(Style::default().fg(Color::DarkGray))
        };
        Row::new(vec![
            Cell::from(s.account.id.to_string()),
            Cell::from(truncate(&s.account.name, 30)),
            status,
            Cell::from(format!("{:.2}", s.current_balance)),
            Cell::from(format!("{:.2}", s.total_yield)).style(Style::default().fg(amount_color(s.total_yield))),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(32),
            Constraint::Length(8),
            Constraint::Length(16),
            Constraint::Length(14),
        ],
    )
    .header(header_row(&["ID", "Name", "Status", "Balance", "Yield"]))
    .block(Block::default().borders(Borders::ALL).title(" Accounts "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.accounts_state);
}

fn render_history(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.filtered_history.iter().map(|row| {
        Row::new(vec![
            Cell::from(row.entry.date.to_string()),
            Cell::from(truncate(&row.account_name, 20)),
            Cell::from(row.entry.entry_type.as_str()),
            Cell::from(format!("{:.2}", row.entry.operation_amount))
                .style(Style::default().fg(amount_color(row.entry.operation_amount))),
            Cell::from(format!("{:.2}", row.entry.end_balance)),
            Cell::from(format!("{:.2}", row.variation)).style(Style::default().fg(amount_color(row.variation))),
        ])
    });

    let title = match (app.type_filter, app.account_filter) {
        (None, None) => " History ".to_string(),
        (t, a) => format!(
            " History [{}{}] ",
            t.map(|t| t.as_str().to_string()).unwrap_or_default(),
            a.map(|id| format!(" account #{}", id)).unwrap_or_default()
        ),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(22),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(14),
        ],
    )
    .header(header_row(&["Date", "Account", "Type", "Value", "End value", "Variation"]))
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.history_state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let lines = match app.selected_entry() {
        Some(row) => {
            let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::Yellow));
            vec![
                Line::from(vec![label("Entry:       "), Span::raw(format!("#{}", row.entry.id))]),
                Line::from(vec![label("Account:     "), Span::raw(row.account_name.clone())]),
                Line::from(vec![label("Date:        "), Span::raw(row.entry.date.to_string())]),
                Line::from(vec![label("Type:        "), Span::raw(row.entry.entry_type.to_string())]),
                Line::from(vec![label("Value:       "), Span::raw(format!("{:.2}", row.entry.operation_amount))]),
                Line::from(vec![label("End value:   "), Span::raw(format!("{:.2}", row.entry.end_balance))]),
                Line::from(vec![label("Variation:   "), Span::raw(format!("{:.2}", row.variation))]),
                Line::from(vec![
                    label("Description: "),
                    Span::raw(row.entry.description.clone().unwrap_or_default()),
                ]),
            ]
        }
        None => vec![Line::from("No entry selected")],
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Detail "),
    );
    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];
    let key = |s: &'static str| Span::styled(s, Style::default().fg(Color::Yellow));

    match app.current_page {
        Page::Accounts => {
            spans.push(key("Enter"));
            spans.push(Span::raw(" History of account | "));
        }
        Page::History => {
            spans.push(key("1-6"));
            spans.push(Span::raw(" I/R/A/W/E/V | "));
            spans.push(key("0"));
            spans.push(Span::raw(" All types | "));
            spans.push(key("c"));
            spans.push(Span::raw(" Clear | "));
            spans.push(key("Enter"));
            spans.push(Span::raw(" Details | "));
        }
    }
    spans.push(key("Tab"));
    spans.push(Span::raw(" Page | "));
    spans.push(key("↑/↓"));
    spans.push(Span::raw(" Nav | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(Block::default().borders(Borders::ALL));
    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
