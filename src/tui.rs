use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::collections::HashSet;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::warn;

use crate::config::Config;
use crate::error::{BoardError, BoardResult};
use crate::models::{ApplicationStatus, Job};
use crate::scroll::ScrollTrigger;
use crate::search::{JobSearch, PageOutcome, SearchView};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const NOTICE_TTL: Duration = Duration::from_secs(4);

struct BrowseState {
    selected: usize,
    scroll_offset: u16,
    notice: Option<(String, Instant)>,
    trigger: ScrollTrigger,
}

impl BrowseState {
    fn new(config: &Config) -> Self {
        Self {
            selected: 0,
            scroll_offset: 0,
            notice: None,
            trigger: ScrollTrigger::new(config.scroll_threshold, config.scroll_interval),
        }
    }

    fn next(&mut self, len: usize) {
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    /// Rows between the cursor and the last loaded row.
    fn distance_from_bottom(&self, len: usize) -> usize {
        len.saturating_sub(1).saturating_sub(self.selected)
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.notice = Some((message.into(), Instant::now()));
    }

    fn current_notice(&mut self) -> Option<&str> {
        if self.notice.as_ref().is_some_and(|(_, at)| at.elapsed() > NOTICE_TTL) {
            self.notice = None;
        }
        self.notice.as_ref().map(|(m, _)| m.as_str())
    }
}

/// Page loads started by the scroll trigger. Dropping the set, or
/// [`PageLoads::cancel`], aborts whatever is still in flight.
#[derive(Default)]
struct PageLoads {
    pending: JoinSet<BoardResult<PageOutcome>>,
}

impl PageLoads {
    fn spawn(&mut self, search: &Arc<JobSearch>) {
        let search = Arc::clone(search);
        self.pending.spawn(async move { search.load_next_page().await });
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    /// Collect finished loads and turn their outcomes into notices.
    fn drain(&mut self, state: &mut BrowseState) {
        while let Some(joined) = self.pending.try_join_next() {
            match joined {
                Ok(Ok(PageOutcome::Loaded { added })) if added > 0 => {
                    state.notify(format!("Loaded {} more", added));
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => state.notify(describe(&e)),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "page task failed"),
            }
        }
    }

    /// Abort every pending load and wait until they are gone.
    async fn cancel(&mut self) {
        self.pending.shutdown().await;
    }
}

/// Full-screen list of the current search results. Moving near the bottom
/// loads the next page in the background; leaving the view aborts any page
/// still in flight.
pub async fn run_browse(search: Arc<JobSearch>, config: &Config) -> Result<()> {
    let view = search.view();
    if !view.searched {
        println!("No search yet. Run: search -k <keyword> -l <location>");
        return Ok(());
    }
    if view.results.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    let mut state = BrowseState::new(config);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &search, &mut state).await;

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn describe(err: &BoardError) -> String {
    match err {
        BoardError::Conflict(msg) => msg.clone(),
        other => format!("error: {}", other),
    }
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    search: &Arc<JobSearch>,
    state: &mut BrowseState,
) -> Result<()> {
    let mut loads = PageLoads::default();
    let mut list_state = ListState::default();

    loop {
        loads.drain(state);

        let view = search.view();
        let saved = search.saved_ids();
        let len = view.results.len();
        if len > 0 && state.selected >= len {
            state.selected = len - 1;
        }
        list_state.select(if len == 0 { None } else { Some(state.selected) });
        let notice = state.current_notice().map(str::to_string);
        terminal.draw(|frame| draw(frame, &view, &saved, state, notice.as_deref(), &mut list_state))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let current = view.results.get(state.selected).map(|j| j.id.clone());
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Down | KeyCode::Char('j') => state.next(len),
            KeyCode::Up | KeyCode::Char('k') => state.prev(),
            KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
            KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
            KeyCode::Char('s') => {
                if let Some(id) = current {
                    match search.toggle_saved_job(&id).await {
                        Ok(true) => state.notify("Job saved"),
                        Ok(false) => state.notify("Job removed from saved"),
                        Err(e) => state.notify(describe(&e)),
                    }
                }
            }
            KeyCode::Char('a') => {
                if let Some(id) = current {
                    match search.apply(&id).await {
                        Ok(_) => state.notify("Application submitted"),
                        Err(e) => state.notify(describe(&e)),
                    }
                }
            }
            _ => {}
        }

        if view.has_more
            && !view.is_loading
            && state.trigger.poll(state.distance_from_bottom(len), Instant::now())
        {
            loads.spawn(search);
        }
    }

    loads.cancel().await;
    Ok(())
}

/// Shorten to `max` characters, ending in "...".
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn draw(
    frame: &mut Frame,
    view: &SearchView,
    saved: &HashSet<String>,
    state: &BrowseState,
    notice: Option<&str>,
    list_state: &mut ListState,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1), Constraint::Length(1)])
        .split(frame.area());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[0]);

    // Left panel: job list
    let items: Vec<ListItem> = view
        .results
        .iter()
        .map(|job| {
            let saved_icon = if saved.contains(&job.id) { "*" } else { " " };
            let applied_icon = if job.applied_status { "+" } else { " " };
            ListItem::new(format!(
                "{}{} {} | {}",
                saved_icon,
                applied_icon,
                truncate(&job.title, 32),
                job.company.name
            ))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " {} ({}, page {}) ",
            view.criteria,
            view.results.len(),
            view.page
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: job detail
    let detail = match view.results.get(state.selected) {
        Some(job) => build_detail(job, saved.contains(&job.id)),
        None => Text::raw("No job selected"),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Status line
    let status = if view.is_loading {
        Span::styled(" Loading more jobs...", Style::default().fg(Color::Yellow))
    } else if let Some(msg) = notice {
        Span::styled(format!(" {}", msg), Style::default().fg(Color::Cyan))
    } else if !view.has_more {
        Span::styled(" No more jobs available", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw("")
    };
    frame.render_widget(Paragraph::new(Line::from(status)), rows[1]);

    // Footer help
    let help = Paragraph::new(" j/k:navigate  J/K:scroll  s:save/unsave  a:apply  q:quit")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[2]);
}

fn build_detail(job: &Job, saved: bool) -> Text<'_> {
    let mut lines: Vec<Line> = Vec::new();

    // Header
    lines.push(Line::from(Span::styled(
        job.title.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    if !job.company.name.is_empty() {
        lines.push(Line::from(format!("at {}", job.company.name)));
    }
    let place = job.place();
    if !place.is_empty() {
        lines.push(Line::from(place));
    }

    if let Some(stage) = job.application_stage() {
        let style = match stage {
            ApplicationStatus::Accepted => Style::default().fg(Color::Green),
            ApplicationStatus::Rejected => Style::default().fg(Color::Red),
            ApplicationStatus::UnderReview => Style::default().fg(Color::Yellow),
            ApplicationStatus::Applied => Style::default().fg(Color::Cyan),
        };
        lines.push(Line::from(Span::styled(format!("Status: {}", stage.label()), style)));
    }
    if saved {
        lines.push(Line::from(Span::styled("Saved", Style::default().fg(Color::Cyan))));
    }

    if let Some(kind) = &job.employment_type {
        lines.push(Line::from(format!("Type: {}", kind)));
    }
    if let Some(salary) = &job.salary {
        lines.push(Line::from(format!("Salary: ${}", salary)));
    }
    if let Some(openings) = job.openings {
        lines.push(Line::from(format!("Openings: {}", openings)));
    }
    match (&job.start_date, &job.app_deadline) {
        (Some(start), Some(deadline)) => {
            lines.push(Line::from(format!("Starts {}, apply by {}", start, deadline)))
        }
        (Some(start), None) => lines.push(Line::from(format!("Starts {}", start))),
        (None, Some(deadline)) => lines.push(Line::from(format!("Apply by {}", deadline))),
        (None, None) => {}
    }

    lines.push(Line::from(""));

    if !job.description.is_empty() {
        lines.push(Line::from(Span::styled(
            "DESCRIPTION",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(&job.description, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
        lines.push(Line::from(""));
    }

    let qualifications = job.qualification_list();
    if !qualifications.is_empty() {
        lines.push(Line::from(Span::styled(
            "QUALIFICATIONS",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for q in qualifications {
            lines.push(Line::from(format!("  - {}", q)));
        }
        lines.push(Line::from(""));
    }

    if !job.skills.is_empty() {
        lines.push(Line::from(Span::styled(
            "SKILLS",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(format!("  {}", job.skills)));
        lines.push(Line::from(""));
    }

    if !job.company.description.is_empty() {
        lines.push(Line::from(Span::styled(
            "ABOUT THE COMPANY",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(&job.company.description, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    Text::from(lines)
}
