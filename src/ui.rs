use crate::preview::{paginate, PreviewPage, PreviewTab};
use crate::record::Record;
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
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Tabs},
    Frame, Terminal,
};
use std::io;

/// Visible columns at once; the rest are reached with ←/→ + Shift.
const VISIBLE_COLUMNS: usize = 6;

pub struct App {
    pub de: Vec<Record>,
    pub product: Vec<Record>,
    pub merged: Vec<Record>,
    pub tab: PreviewTab,
    /// 1-based, shared by all tabs and reset when switching
    pub page: usize,
    pub rows_per_page: usize,
    pub column_offset: usize,
}

impl App {
    pub fn new(de: Vec<Record>, product: Vec<Record>, merged: Vec<Record>, rows_per_page: usize) -> Self {
        let tab = if merged.is_empty() {
            PreviewTab::De
        } else {
            PreviewTab::Merged
        };

        Self {
            de,
            product,
            merged,
            tab,
            page: 1,
            rows_per_page: rows_per_page.max(1),
            column_offset: 0,
        }
    }

    pub fn records(&self) -> &[Record] {
        match self.tab {
            PreviewTab::De => &self.de,
            PreviewTab::Product => &self.product,
            PreviewTab::Merged => &self.merged,
        }
    }

    pub fn current_page(&self) -> Option<PreviewPage<'_>> {
        paginate(self.records(), self.page, self.rows_per_page)
    }

    pub fn next_tab(&mut self) {
        self.tab = self.tab.next();
        self.reset_position();
    }

    pub fn previous_tab(&mut self) {
        self.tab = self.tab.previous();
        self.reset_position();
    }

    pub fn next_page(&mut self) {
        if let Some(page) = self.current_page() {
            if page.has_next() {
                self.page = page.page + 1;
            }
        }
    }

    pub fn previous_page(&mut self) {
        if self.page > 1 {
            self.page -= 1;
        }
    }

    pub fn scroll_right(&mut self) {
        let columns = self.current_page().map_or(0, |p| p.headers.len());
        if self.column_offset + VISIBLE_COLUMNS < columns {
            self.column_offset += 1;
        }
    }

    pub fn scroll_left(&mut self) {
        self.column_offset = self.column_offset.saturating_sub(1);
    }

    fn reset_position(&mut self) {
        self.page = 1;
        self.column_offset = 0;
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

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            let shift = key.modifiers.contains(KeyModifiers::SHIFT);
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.next_tab(),
                KeyCode::BackTab => app.previous_tab(),
                KeyCode::Right if shift => app.scroll_right(),
                KeyCode::Left if shift => app.scroll_left(),
                KeyCode::Right | KeyCode::Char('l') | KeyCode::PageDown => app.next_page(),
                KeyCode::Left | KeyCode::Char('h') | KeyCode::PageUp => app.previous_page(),
                KeyCode::Char('L') => app.scroll_right(),
                KeyCode::Char('H') => app.scroll_left(),
                KeyCode::Home => app.page = 1,
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tabs
            Constraint::Min(0),    // Table
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_tabs(f, chunks[0], app);
    render_table(f, chunks[1], app);
    render_status_bar(f, chunks[2], app);
}

fn render_tabs(f: &mut Frame, area: Rect, app: &App) {
    let tabs = [PreviewTab::De, PreviewTab::Product, PreviewTab::Merged];
    let titles: Vec<Line> = tabs
        .iter()
        .map(|tab| {
            let count = match tab {
                PreviewTab::De => app.de.len(),
                PreviewTab::Product => app.product.len(),
                PreviewTab::Merged => app.merged.len(),
            };
            Line::from(format!("{} ({})", tab.title(), count))
        })
        .collect();

    let selected = tabs.iter().position(|t| *t == app.tab).unwrap_or(0);

    let widget = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(" Catalog Merge "))
        .select(selected)
        .style(Style::default().fg(Color::Gray))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        );

    f.render_widget(widget, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", app.tab.title()));

    let Some(page) = app.current_page() else {
        let empty = Paragraph::new("No rows to show").block(block);
        f.render_widget(empty, area);
        return;
    };

    let start = app.column_offset.min(page.headers.len());
    let end = (start + VISIBLE_COLUMNS).min(page.headers.len());
    let visible = start..end;

    let header = Row::new(
        page.headers[visible.clone()]
            .iter()
            .map(|h| Cell::from(h.clone())),
    )
    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    .height(1);

    let rows: Vec<Row> = page
        .cells()
        .into_iter()
        .enumerate()
        .map(|(i, cells)| {
            let style = if i % 2 == 0 {
                Style::default()
            } else {
                Style::default().fg(Color::Gray)
            };
            Row::new(cells[visible.clone()].iter().map(|c| Cell::from(c.clone()))).style(style)
        })
        .collect();

    let widths = vec![Constraint::Min(12); visible.len()];
    let table = Table::new(rows, widths).header(header).block(block);

    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let position = app
        .current_page()
        .map(|p| format!("{}  •  {}", p.showing(), p.page_label()))
        .unwrap_or_else(|| "Empty".to_string());

    let line = Line::from(vec![
        Span::styled(position, Style::default().fg(Color::Green)),
        Span::raw("   "),
        Span::styled(
            "Tab: switch  ←/→: page  Shift+←/→: columns  q: quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let status = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(status, area);
}
