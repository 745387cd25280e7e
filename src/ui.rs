use crate::board::{Board, Card};
use crate::deal::parse_timestamp;
use crate::errors::BoardError;
use crate::state::{AppState, Theme};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the board is re-read through the cache while the UI is idle.
pub const TICK_RATE: Duration = Duration::from_secs(30);

/// What the board screen needs from the outside world.
pub trait UiHooks {
    /// The board under the cache policy: cached while fresh, fetched once
    /// stale or expired.
    fn board(&mut self) -> std::result::Result<Arc<Board>, BoardError>;

    /// Fetch a fresh board, bypassing the cache.
    fn refresh(&mut self) -> std::result::Result<Arc<Board>, BoardError>;

    /// Persist a theme the user picked.
    fn theme_changed(&mut self, theme: Theme);
}

pub struct App {
    pub board: Board,
    pub state: AppState,
    pub selected_column: usize,
    pub card_states: Vec<ListState>,
    pub error: Option<BoardError>,
    /// Board last received from the hooks
    shown: Option<Arc<Board>>,
}

#[derive(Debug, Default, PartialEq)]
pub struct BoardStats {
    pub cards: usize,
    pub total_value: f64,
}

impl App {
    pub fn new(board: Board, state: AppState) -> Self {
        let mut app = Self {
            board: Board { columns: Vec::new() },
            state,
            selected_column: 0,
            card_states: Vec::new(),
            error: None,
            shown: None,
        };
        app.replace_board(board);
        app
    }

    /// Swap in a new board, keeping the selection where it still fits.
    pub fn replace_board(&mut self, board: Board) {
        let previous: Vec<Option<usize>> = self.card_states.iter().map(ListState::selected).collect();

        self.card_states = board
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let mut state = ListState::default();
                if !column.items.is_empty() {
                    let keep = previous.get(i).copied().flatten().unwrap_or(0);
                    state.select(Some(keep.min(column.items.len() - 1)));
                }
                state
            })
            .collect();

        self.selected_column = self
            .selected_column
            .min(board.columns.len().saturating_sub(1));
        self.board = board;
        self.error = None;
        self.state.loading.set(false);
    }

    /// Take a fetch result. An unchanged board keeps the selection as is.
    pub fn apply(&mut self, result: std::result::Result<Arc<Board>, BoardError>) {
        match result {
            Ok(board) => {
                let unchanged = self
                    .shown
                    .as_ref()
                    .is_some_and(|shown| Arc::ptr_eq(shown, &board));
                if unchanged {
                    self.error = None;
                    self.state.loading.set(false);
                } else {
                    self.replace_board(board.as_ref().clone());
                    self.shown = Some(board);
                }
            }
            Err(err) => self.set_error(err),
        }
    }

    pub fn set_error(&mut self, error: BoardError) {
        self.error = Some(error);
        self.state.loading.set(false);
    }

    pub fn selected_card(&self) -> Option<&Card> {
        let column = self.board.columns.get(self.selected_column)?;
        let index = self.card_states.get(self.selected_column)?.selected()?;
        column.items.get(index)
    }

    pub fn next_column(&mut self) {
        let len = self.board.columns.len();
        if len > 0 {
            self.selected_column = (self.selected_column + 1) % len;
        }
    }

    pub fn previous_column(&mut self) {
        let len = self.board.columns.len();
        if len > 0 {
            self.selected_column = (self.selected_column + len - 1) % len;
        }
    }

    pub fn next_card(&mut self) {
        self.step_card(1);
    }

    pub fn previous_card(&mut self) {
        self.step_card(-1);
    }

    fn step_card(&mut self, delta: isize) {
        let Some(column) = self.board.columns.get(self.selected_column) else {
            return;
        };
        let len = column.items.len();
        if len == 0 {
            return;
        }
        let state = &mut self.card_states[self.selected_column];
        let current = state.selected().unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len as isize) as usize;
        state.select(Some(next));
    }

    /// Open the side panel on the selected card.
    pub fn open_selected(&mut self) {
        if let Some(card) = self.selected_card().cloned() {
            self.state.deal_slide.set(card);
        }
    }

    pub fn toggle_detail(&mut self) {
        match (self.state.deal_slide.is_open(), self.selected_card()) {
            (false, Some(_)) => self.open_selected(),
            _ => self.state.deal_slide.toggle(),
        }
    }

    pub fn stats(&self) -> BoardStats {
        BoardStats {
            cards: self.board.total_cards(),
            total_value: self.board.columns.iter().map(|c| c.total_price()).sum(),
        }
    }
}

/// Whether the terminal advertises a dark background (`COLORFGBG`).
pub fn terminal_prefers_dark() -> bool {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|value| value.rsplit(';').next().and_then(|bg| bg.parse::<u8>().ok()))
        .map(|bg| bg < 7 || bg == 8)
        .unwrap_or(false)
}

pub fn run_ui(app: &mut App, hooks: &mut dyn UiHooks) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app, hooks);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    hooks: &mut dyn UiHooks,
) -> io::Result<()> {
    let mut last_tick = Instant::now();

    loop {
        if last_tick.elapsed() >= TICK_RATE {
            on_tick(app, hooks);
            last_tick = Instant::now();
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = TICK_RATE.saturating_sub(last_tick.elapsed());
        if !event::poll(timeout)? {
            continue;
        }

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Esc if app.state.deal_slide.is_open() => app.state.deal_slide.clear(),
                KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => app.next_column(),
                KeyCode::Left | KeyCode::Char('h') | KeyCode::BackTab => app.previous_column(),
                KeyCode::Down | KeyCode::Char('j') => app.next_card(),
                KeyCode::Up | KeyCode::Char('k') => app.previous_card(),
                KeyCode::Char('t') => {
                    let theme = app.state.theme.toggle();
                    hooks.theme_changed(theme);
                }
                KeyCode::Char('r') => {
                    app.state.loading.set(true);
                    terminal.draw(|f| ui(f, app))?;
                    app.apply(hooks.refresh());
                    last_tick = Instant::now();
                }
                _ => {}
            }
        }
    }
}

/// Re-read the board so freshness and expiry apply while the screen is idle.
fn on_tick(app: &mut App, hooks: &mut dyn UiHooks) {
    app.apply(hooks.board());
}

// ============================================================================
// Rendering
// ============================================================================

struct Palette {
    text: Color,
    muted: Color,
    accent: Color,
    border: Color,
    highlight: Color,
    background: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            text: Color::White,
            muted: Color::DarkGray,
            accent: Color::Cyan,
            border: Color::Gray,
            highlight: Color::DarkGray,
            background: Color::Black,
        },
        Theme::Light => Palette {
            text: Color::Black,
            muted: Color::Gray,
            accent: Color::Blue,
            border: Color::DarkGray,
            highlight: Color::Gray,
            background: Color::White,
        },
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let colors = palette(app.state.theme.theme());
    f.render_widget(
        Block::default().style(Style::default().bg(colors.background)),
        f.size(),
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Board
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app, &colors);

    if app.state.deal_slide.is_open() {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(chunks[1]);

        render_board(f, content_chunks[0], app, &colors);
        render_deal_slide(f, content_chunks[1], app, &colors);
    } else {
        render_board(f, chunks[1], app, &colors);
    }

    render_status_bar(f, chunks[2], app, &colors);
}

fn render_header(f: &mut Frame, area: Rect, app: &App, colors: &Palette) {
    let stats = app.stats();

    let mut spans = vec![
        Span::styled(
            "Deals",
            Style::default().fg(colors.accent).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(format!("Cards: {}", stats.cards), Style::default().fg(colors.text)),
        Span::raw("  |  "),
        Span::styled(
            format!("Pipeline: {}", format_price(stats.total_value)),
            Style::default().fg(Color::Green),
        ),
    ];

    if app.state.auth.is_auth() {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("Signed in as {}", app.state.auth.user_name()),
            Style::default().fg(colors.muted),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(colors.accent)),
    );

    f.render_widget(header, area);
}

fn render_board(f: &mut Frame, area: Rect, app: &mut App, colors: &Palette) {
    if let Some(err) = &app.error {
        let message = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("  {}", err.message),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "  Press r to try again",
                Style::default().fg(colors.muted).add_modifier(Modifier::ITALIC),
            )),
        ])
        .block(Block::default().borders(Borders::ALL).title(" Board "));
        f.render_widget(message, area);
        return;
    }

    let count = app.board.columns.len().max(1) as u32;
    let constraints: Vec<Constraint> = app
        .board
        .columns
        .iter()
        .map(|_| Constraint::Ratio(1, count))
        .collect();
    let areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (i, column) in app.board.columns.iter().enumerate() {
        let selected = i == app.selected_column;
        let width = areas[i].width.saturating_sub(4) as usize;

        let items: Vec<ListItem> = column
            .items
            .iter()
            .map(|card| {
                ListItem::new(vec![
                    Line::from(Span::styled(
                        truncate(&card.name, width),
                        Style::default().fg(colors.text).add_modifier(Modifier::BOLD),
                    )),
                    Line::from(vec![
                        Span::styled(format_price(card.price), Style::default().fg(Color::Green)),
                        Span::raw(" · "),
                        Span::styled(
                            truncate(&card.company_name, width.saturating_sub(14)),
                            Style::default().fg(colors.muted),
                        ),
                    ]),
                    Line::from(Span::styled(
                        format_date(&card.created_at),
                        Style::default().fg(colors.muted).add_modifier(Modifier::ITALIC),
                    )),
                    Line::from(""),
                ])
            })
            .collect();

        let border_style = if selected {
            Style::default().fg(colors.accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(colors.border)
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(format!(" {} ({}) ", column.name, column.items.len())),
            )
            .highlight_style(if selected {
                Style::default().bg(colors.highlight)
            } else {
                Style::default()
            })
            .highlight_symbol(if selected { "→ " } else { "  " });

        f.render_stateful_widget(list, areas[i], &mut app.card_states[i]);
    }
}

fn render_deal_slide(f: &mut Frame, area: Rect, app: &App, colors: &Palette) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Deal ");

    let Some(card) = app.state.deal_slide.card() else {
        f.render_widget(Paragraph::new("No deal selected").block(block), area);
        return;
    };

    let label = Style::default().fg(colors.accent).add_modifier(Modifier::BOLD);
    let content = vec![
        Line::from(""),
        Line::from(vec![Span::styled("  Name: ", label), Span::raw(card.name.as_str())]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Price: ", label),
            Span::styled(format_price(card.price), Style::default().fg(Color::Green)),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("  Company: ", label), Span::raw(card.company_name.as_str())]),
        Line::from(""),
        Line::from(vec![Span::styled("  Stage: ", label), Span::raw(card.status.as_str())]),
        Line::from(""),
        Line::from(vec![Span::styled("  Created: ", label), Span::raw(format_date(&card.created_at))]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Id: ", label),
            Span::styled(card.id.as_str(), Style::default().fg(colors.muted)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "  Esc to close",
            Style::default().fg(colors.muted).add_modifier(Modifier::ITALIC),
        )),
    ];

    f.render_widget(Paragraph::new(content).wrap(Wrap { trim: false }).block(block), area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App, colors: &Palette) {
    let key = Style::default().fg(Color::Yellow);
    let mut spans = Vec::new();

    if app.state.loading.is_loading() {
        spans.push(Span::styled(" Loading… ", Style::default().fg(colors.accent)));
        spans.push(Span::raw("| "));
    }

    spans.extend([
        Span::styled(" ←/→", key),
        Span::raw(" Column | "),
        Span::styled("↑/↓", key),
        Span::raw(" Card | "),
        Span::styled("Enter", key),
        Span::raw(" Details | "),
        Span::styled("r", key),
        Span::raw(" Refresh | "),
        Span::styled("t", key),
        Span::raw(format!(
            " Theme ({}{}) | ",
            app.state.theme.theme(),
            if app.state.theme.is_explicit() { "" } else { ", auto" }
        )),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ]);

    let status_bar = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(colors.border)),
    );

    f.render_widget(status_bar, area);
}

fn format_price(value: f64) -> String {
    format!("${:.2}", value)
}

fn format_date(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| dt.format("%d %b %Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{assemble, BoardTemplate, ColumnTemplate};
    use crate::deal::Deal;
    use crate::errors::FetchError;
    use crate::state::ThemeState;

    fn board() -> Board {
        let template = BoardTemplate::new(vec![
            ColumnTemplate::new("new", "New"),
            ColumnTemplate::new("won", "Won"),
            ColumnTemplate::new("lost", "Lost"),
        ])
        .unwrap();
        assemble(
            &template,
            &[
                Deal::new("1", "2024-01-01", "A", 10.0, "new"),
                Deal::new("2", "2024-01-02", "B", 20.0, "new"),
                Deal::new("3", "2024-01-03", "C", 30.0, "won"),
            ],
        )
    }

    fn app() -> App {
        App::new(board(), AppState::new(ThemeState::init(None, false)))
    }

    #[test]
    fn test_new_app_selects_first_cards() {
        let app = app();

        assert_eq!(app.selected_column, 0);
        assert_eq!(app.selected_card().unwrap().name, "B");
        assert_eq!(app.card_states[2].selected(), None);
        assert!(!app.state.loading.is_loading());
    }

    #[test]
    fn test_column_navigation_wraps() {
        let mut app = app();

        app.previous_column();
        assert_eq!(app.selected_column, 2);
        assert!(app.selected_card().is_none());

        app.next_column();
        app.next_column();
        assert_eq!(app.selected_column, 1);
        assert_eq!(app.selected_card().unwrap().name, "C");
    }

    #[test]
    fn test_card_navigation_wraps() {
        let mut app = app();

        app.next_card();
        assert_eq!(app.selected_card().unwrap().name, "A");
        app.next_card();
        assert_eq!(app.selected_card().unwrap().name, "B");
        app.previous_card();
        assert_eq!(app.selected_card().unwrap().name, "A");

        // Empty column is a no-op
        app.selected_column = 2;
        app.next_card();
        assert!(app.selected_card().is_none());
    }

    #[test]
    fn test_detail_panel() {
        let mut app = app();

        app.toggle_detail();
        assert!(app.state.deal_slide.is_open());
        assert_eq!(app.state.deal_slide.card().unwrap().name, "B");

        app.toggle_detail();
        assert!(!app.state.deal_slide.is_open());

        // Panel shows a copy; the board is untouched
        app.open_selected();
        assert_eq!(app.board.columns[0].items[0].name, "B");
    }

    #[test]
    fn test_replace_board_clamps_selection() {
        let mut app = app();
        app.next_card();
        app.selected_column = 2;

        let template = BoardTemplate::new(vec![ColumnTemplate::new("new", "New")]).unwrap();
        app.replace_board(assemble(&template, &[Deal::new("9", "2024-02-01", "Z", 1.0, "new")]));

        assert_eq!(app.selected_column, 0);
        assert_eq!(app.card_states[0].selected(), Some(0));
        assert_eq!(app.selected_card().unwrap().name, "Z");
    }

    #[test]
    fn test_error_then_recovery() {
        let mut app = app();
        app.set_error(FetchError::Unavailable("offline".to_string()).into());
        assert!(app.error.is_some());

        app.replace_board(board());
        assert!(app.error.is_none());
    }

    struct ScriptedHooks {
        boards: Vec<std::result::Result<Arc<Board>, BoardError>>,
    }

    impl UiHooks for ScriptedHooks {
        fn board(&mut self) -> std::result::Result<Arc<Board>, BoardError> {
            self.boards.remove(0)
        }

        fn refresh(&mut self) -> std::result::Result<Arc<Board>, BoardError> {
            self.boards.remove(0)
        }

        fn theme_changed(&mut self, _theme: Theme) {}
    }

    #[test]
    fn test_apply_same_board_keeps_selection() {
        let mut app = app();
        let shared = Arc::new(board());
        app.apply(Ok(Arc::clone(&shared)));
        app.next_card();
        assert_eq!(app.selected_card().unwrap().name, "A");

        app.apply(Ok(shared));
        assert_eq!(app.selected_card().unwrap().name, "A");
        assert!(!app.state.loading.is_loading());
    }

    #[test]
    fn test_tick_reads_board_through_hooks() {
        let template = BoardTemplate::new(vec![ColumnTemplate::new("new", "New")]).unwrap();
        let newer = assemble(&template, &[Deal::new("9", "2024-03-01", "Z", 5.0, "new")]);
        let mut hooks = ScriptedHooks {
            boards: vec![
                Ok(Arc::new(newer)),
                Err(FetchError::Unavailable("offline".to_string()).into()),
            ],
        };
        let mut app = app();

        on_tick(&mut app, &mut hooks);
        assert_eq!(app.selected_card().unwrap().name, "Z");
        assert!(app.error.is_none());

        // A board past its cache window comes back as an error, not the old board
        on_tick(&mut app, &mut hooks);
        assert!(app.error.as_ref().unwrap().is_transport());
        assert!(hooks.boards.is_empty());
    }

    #[test]
    fn test_stats() {
        let stats = app().stats();
        assert_eq!(stats, BoardStats { cards: 3, total_value: 60.0 });
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_price(1500.0), "$1500.00");
        assert_eq!(format_date("2024-01-05"), "05 Jan 2024");
        assert_eq!(format_date("garbage"), "garbage");
        assert_eq!(truncate("Website redesign", 10), "Website...");
        assert_eq!(truncate("Café", 10), "Café");
        assert_eq!(truncate("abcdef", 2), "ab");
    }
}
