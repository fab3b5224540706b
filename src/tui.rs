use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph},
};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::charts::{ChartSlot, placeholder};
use crate::errors::AppError;
use crate::pipeline::{ChartGroup, Pipeline, PipelineState, ViewData};
use crate::storage_utils::ViewConfig;

const CHART_HEIGHT: u16 = 12;

// --- App State ---

pub struct App {
    pipeline: Pipeline,
    views: Vec<ViewConfig>,
    active_view: usize,
    data: Option<ViewData>,
    error: Option<String>,
    /// 0 = all groups, n = only group n-1 of the current data.
    group_filter: usize,
    scroll: usize,
    is_refreshing: bool,
}

impl App {
    pub fn new(pipeline: Pipeline, views: Vec<ViewConfig>, initial: Option<ViewData>) -> Self {
        Self {
            pipeline,
            views,
            active_view: 0,
            data: initial,
            error: None,
            group_filter: 0,
            scroll: 0,
            is_refreshing: false,
        }
    }

    fn set_data(&mut self, new_data: ViewData) {
        self.data = Some(new_data);
        self.error = None;
        self.group_filter = 0;
        self.scroll = 0;
        self.is_refreshing = false;
    }

    fn set_error(&mut self, message: String) {
        self.error = Some(message);
        self.is_refreshing = false;
    }

    /// Install a refresh result, but only if it still belongs to the view on
    /// screen; a result that raced a view switch is dropped.
    fn apply_refresh(&mut self, view: usize, result: Result<ViewData, AppError>) {
        self.is_refreshing = false;
        if view != self.active_view {
            return;
        }
        match result {
            Ok(new_data) => self.set_data(new_data),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    fn switch_view(&mut self, delta: isize) {
        if self.views.is_empty() {
            return;
        }
        let len = self.views.len() as isize;
        self.active_view = ((self.active_view as isize + delta).rem_euclid(len)) as usize;
        // Stale data from another view is not shown; each view decides when
        // to load via refresh. Any in-flight refresh belongs to the old view,
        // so the popup goes away too.
        self.data = None;
        self.error = None;
        self.group_filter = 0;
        self.scroll = 0;
        self.is_refreshing = false;
    }

    fn filter_names(&self) -> Vec<String> {
        let mut names = vec!["All Groups".to_string()];
        if let Some(data) = &self.data {
            names.extend(data.groups.iter().map(|g| g.title.clone()));
        }
        names
    }

    fn visible_groups(&self) -> Vec<&ChartGroup> {
        let Some(data) = &self.data else {
            return Vec::new();
        };
        if self.group_filter == 0 {
            data.groups.iter().collect()
        } else {
            data.groups
                .iter()
                .skip(self.group_filter - 1)
                .take(1)
                .collect()
        }
    }

    /// Hand the last rendered data back for the post-exit summary.
    pub fn into_data(self) -> Option<ViewData> {
        self.data
    }
}

// --- TUI entry ---

pub async fn run_tui(app: App) -> Result<Option<ViewData>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<Option<ViewData>> {
    let (data_tx, mut data_rx) = mpsc::channel::<(usize, Result<ViewData, AppError>)>(1);

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if let Ok((view, result)) = data_rx.try_recv() {
            app.apply_refresh(view, result);
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => {
                    if !handle_key_event(key, &mut app, &data_tx) {
                        return Ok(app.into_data());
                    }
                }
                Event::Resize(_, _) => {
                    // Next draw picks up the new size.
                }
                _ => {}
            }
        }
    }
}

fn handle_key_event(
    key: KeyEvent,
    app: &mut App,
    tx: &mpsc::Sender<(usize, Result<ViewData, AppError>)>,
) -> bool {
    match key.code {
        KeyCode::Char('q') => return false,
        KeyCode::F(5) | KeyCode::Char('r') if !app.is_refreshing => {
            app.is_refreshing = true;
            let pipeline = app.pipeline.clone();
            let view_idx = app.active_view;
            let view = app.views[view_idx].clone();
            let tx_clone = tx.clone();
            tokio::spawn(async move {
                let result = pipeline.run_view(&view, |_, _| {}).await;
                let _ = tx_clone.send((view_idx, result)).await;
            });
        }
        KeyCode::Left => app.switch_view(-1),
        KeyCode::Right | KeyCode::Tab => app.switch_view(1),
        KeyCode::Up => app.scroll = app.scroll.saturating_sub(1),
        KeyCode::Down => app.scroll = app.scroll.saturating_add(1),
        KeyCode::PageUp => app.scroll = app.scroll.saturating_sub(4),
        KeyCode::PageDown => app.scroll = app.scroll.saturating_add(4),
        KeyCode::Char(c) => {
            if let Some(digit) = c.to_digit(10) {
                let filters = app.filter_names().len() as u32;
                if digit < filters {
                    app.group_filter = digit as usize;
                    app.scroll = 0;
                }
            }
        }
        _ => {}
    }
    true
}

// --- Drawing ---

fn ui(f: &mut Frame, app: &App) {
    let main_layout =
        Layout::horizontal([Constraint::Percentage(18), Constraint::Percentage(82)])
            .split(f.size());

    draw_sidebar(f, app, main_layout[0]);

    let right = Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).split(main_layout[1]);
    draw_header(f, app, right[0]);
    draw_grid(f, app, right[1]);

    if app.is_refreshing {
        let area = centered_rect(60, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Fetching ticker data...\nPlease wait.")
                .block(Block::default().title("Refreshing").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn draw_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title("Views")
        .title_alignment(Alignment::Center);
    let inner = sidebar_block.inner(area);
    f.render_widget(sidebar_block, area);

    let chunks = Layout::vertical([
        Constraint::Min(1),    // view list + group filter
        Constraint::Length(4), // key help
    ])
    .split(inner);

    let mut lines: Vec<Line> = app
        .views
        .iter()
        .enumerate()
        .map(|(i, view)| {
            let mut line = Line::from(view.name.clone());
            if i == app.active_view {
                line = line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
            }
            line
        })
        .collect();

    lines.push(Line::from(""));
    lines.push(Line::from("Groups:").style(Style::default().fg(Color::DarkGray)));
    for (i, name) in app.filter_names().iter().enumerate() {
        let mut line = Line::from(format!("{i} {name}"));
        if i == app.group_filter {
            line = line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
        }
        lines.push(line);
    }
    f.render_widget(Paragraph::new(lines), chunks[0]);

    let help = vec![
        Line::from("r/F5 refresh  q quit"),
        Line::from("left/right switch view"),
        Line::from("up/down scroll"),
        Line::from("0-9 pick group"),
    ];
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        chunks[1],
    );
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let view_name = &app.views[app.active_view].name;
    let (text, style) = match (&app.error, &app.data) {
        (Some(message), _) => (
            format!("{view_name} — {message}"),
            Style::default().fg(Color::Red),
        ),
        (None, Some(data)) if data.report.state == PipelineState::Failed => (
            format!(
                "{view_name} — all {} tickers failed to load. Press r to retry.",
                data.total
            ),
            Style::default().fg(Color::Red),
        ),
        (None, Some(data)) => {
            let mut text = format!(
                "{view_name} — {} tickers — refreshed {} — {} rendered / {} skipped",
                data.total, data.epoch, data.report.rendered, data.report.skipped
            );
            if !data.report.failed.is_empty() {
                text.push_str(&format!(" / {} failed", data.report.failed.len()));
            }
            (text, Style::default())
        }
        (None, None) => (
            format!("{view_name} — press r to load"),
            Style::default().fg(Color::DarkGray),
        ),
    };
    f.render_widget(
        Paragraph::new(text)
            .style(style)
            .block(Block::default().borders(Borders::ALL)),
        area,
    );
}

/// One scrollable row of the grid.
enum GridRow<'a> {
    Title(&'a str, usize),
    Pair(&'a ChartSlot, Option<&'a ChartSlot>),
    EmptyGroup(&'a str),
}

fn draw_grid(f: &mut Frame, app: &App, area: Rect) {
    let groups = app.visible_groups();
    if groups.is_empty() {
        f.render_widget(
            Paragraph::new("Nothing to render.")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray)),
            area,
        );
        return;
    }

    // Two charts per row, in the order the pipeline supplied them.
    let mut rows: Vec<GridRow> = Vec::new();
    for group in groups {
        rows.push(GridRow::Title(&group.title, group.slots.len()));
        if group.slots.is_empty() {
            rows.push(GridRow::EmptyGroup(&group.title));
            continue;
        }
        for pair in group.slots.chunks(2) {
            rows.push(GridRow::Pair(&pair[0], pair.get(1)));
        }
    }

    let scroll = app.scroll.min(rows.len().saturating_sub(1));
    let mut y = area.y;
    for row in rows.iter().skip(scroll) {
        let remaining = area.bottom().saturating_sub(y);
        if remaining == 0 {
            break;
        }
        match row {
            GridRow::Title(title, count) => {
                let rect = Rect::new(area.x, y, area.width, 1);
                f.render_widget(
                    Paragraph::new(format!("{title} ({count})"))
                        .style(Style::default().fg(Color::Yellow)),
                    rect,
                );
                y += 1;
            }
            GridRow::EmptyGroup(title) => {
                if remaining < 3 {
                    break;
                }
                let rect = Rect::new(area.x, y, area.width, 3);
                f.render_widget(
                    placeholder((*title).to_string(), "no charts in this group".to_string()),
                    rect,
                );
                y += 3;
            }
            GridRow::Pair(left, right) => {
                let height = CHART_HEIGHT.min(remaining);
                if height < 4 {
                    break;
                }
                let rect = Rect::new(area.x, y, area.width, height);
                let cols = Layout::horizontal([
                    Constraint::Percentage(50),
                    Constraint::Percentage(50),
                ])
                .split(rect);
                draw_slot(f, left, cols[0]);
                if let Some(right) = right {
                    draw_slot(f, right, cols[1]);
                }
                y += height;
            }
        }
    }
}

fn draw_slot(f: &mut Frame, slot: &ChartSlot, area: Rect) {
    match slot {
        ChartSlot::Chart(chart) => f.render_widget(chart.widget(), area),
        ChartSlot::Missing { symbol, reason } => f.render_widget(
            placeholder(symbol.to_string(), format!("No data: {reason}")),
            area,
        ),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}
