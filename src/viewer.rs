//! Terminal host: a Markdown pager that the outline is installed into.
//!
//! One text row counts as [`ROW_PX`] pixels so the outline's pixel defaults
//! keep their meaning. Smooth scrolling is an eased per-frame animation.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode, KeyEvent,
    KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{execute, ExecutableCommand};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::prelude::{Color, Modifier, Rect, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::block::{Padding, Title};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::Terminal;
use syntect::highlighting::Theme;
use syntect::parsing::SyntaxSet;
use tracing::{debug, info, warn};

use crate::config::{ConfigOverrides, OutlineConfig};
use crate::media::{Pointer, Viewport};
use crate::outline::disclosure::{DisclosureEvent, PointerKind, Surface};
use crate::outline::host::{Capabilities, GeometryError, PageHost, ScrollBehavior};
use crate::outline::surfaces::Popup;
use crate::outline::{Activation, OutlineSignal, OutlineTracker, PopupKey};
use crate::page::{BlockId, Node, Page, PAGE_CLASS};
use crate::render::render_markdown;

/// Pixels per text row.
pub const ROW_PX: f64 = 16.0;
/// Nominal pixels per text column, used for media queries.
const COLUMN_PX: f64 = 8.0;
const SCROLL_ANIMATION: Duration = Duration::from_millis(280);
const FRAME: Duration = Duration::from_millis(16);
const IDLE_POLL: Duration = Duration::from_millis(120);
const RAIL_WIDTH: u16 = 3;
const POPUP_MAX_WIDTH: u16 = 48;
/// Border rows around the popup list.
const POPUP_CHROME_ROWS: usize = 2;

fn inset_rect(area: Rect, horizontal: u16, vertical: u16) -> Rect {
    let x = area.x.saturating_add(horizontal);
    let y = area.y.saturating_add(vertical);
    let width = area.width.saturating_sub(horizontal.saturating_mul(2));
    let height = area.height.saturating_sub(vertical.saturating_mul(2));
    Rect {
        x,
        y,
        width,
        height,
    }
}

fn usize_to_u16_saturating(value: usize) -> u16 {
    match u16::try_from(value) {
        Ok(v) => v,
        Err(_) => u16::MAX,
    }
}

fn px_to_rows(px: f64) -> u16 {
    usize_to_u16_saturating((px / ROW_PX).round().max(0.0) as usize)
}

/// Media features of a mouse-driven terminal of `(columns, rows)` cells.
pub fn terminal_viewport((columns, rows): (u16, u16)) -> Viewport {
    Viewport {
        width: f64::from(columns) * COLUMN_PX,
        height: f64::from(rows) * ROW_PX,
        pointer: Pointer::Fine,
        hover: true,
    }
}

fn hit(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

#[derive(Clone, Copy, Debug)]
struct ScrollAnimation {
    from: f64,
    to: f64,
    started: Instant,
}

impl ScrollAnimation {
    fn position(&self, now: Instant) -> (f64, bool) {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let t = (elapsed / SCROLL_ANIMATION.as_secs_f64()).clamp(0.0, 1.0);
        let eased = 1.0 - (1.0 - t).powi(3);
        (self.from + (self.to - self.from) * eased, t >= 1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationStep {
    Idle,
    Moved,
    Finished,
}

/// The rendered page plus scroll state, viewed through a terminal viewport.
pub struct TerminalPage {
    page: Page,
    scroll_px: f64,
    viewport_rows: u16,
    animation: Option<ScrollAnimation>,
    fragment: Option<String>,
    focused_block: Option<BlockId>,
    caps: Capabilities,
}

impl TerminalPage {
    pub fn new(page: Page, viewport_rows: u16) -> Self {
        Self {
            page,
            scroll_px: 0.0,
            viewport_rows: viewport_rows.max(1),
            animation: None,
            fragment: None,
            focused_block: None,
            caps: Capabilities {
                scroll_end_events: true,
                position_lock: true,
            },
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn focused_block(&self) -> Option<BlockId> {
        self.focused_block
    }

    pub fn top_row(&self) -> usize {
        (self.scroll_px / ROW_PX).round().max(0.0) as usize
    }

    pub fn viewport_rows(&self) -> u16 {
        self.viewport_rows
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Returns `true` when the clamped scroll position changed.
    pub fn set_viewport_rows(&mut self, rows: u16) -> bool {
        self.viewport_rows = rows.max(1);
        let clamped = self.scroll_px.min(self.max_scroll());
        let changed = clamped != self.scroll_px;
        self.scroll_px = clamped;
        changed
    }

    /// Jumps by whole rows, cancelling any animation in flight.
    pub fn scroll_rows(&mut self, delta: isize) -> bool {
        let target = self.top_row() as f64 + delta as f64;
        self.jump_to(target * ROW_PX)
    }

    pub fn jump_to(&mut self, y: f64) -> bool {
        self.animation = None;
        let y = y.clamp(0.0, self.max_scroll());
        let changed = y != self.scroll_px;
        self.scroll_px = y;
        changed
    }

    /// Advances the smooth-scroll animation.
    pub fn step(&mut self, now: Instant) -> AnimationStep {
        let Some(animation) = self.animation else {
            return AnimationStep::Idle;
        };
        let (y, done) = animation.position(now);
        self.scroll_px = y.clamp(0.0, self.max_scroll());
        if done {
            self.animation = None;
            AnimationStep::Finished
        } else {
            AnimationStep::Moved
        }
    }

    fn block_rows(&self, block: BlockId) -> Result<usize, GeometryError> {
        self.page
            .block(block)
            .map(|layout| layout.top_line)
            .ok_or(GeometryError::MissingBlock(block.0))
    }
}

impl PageHost for TerminalPage {
    fn document(&self) -> &Page {
        &self.page
    }

    fn claim_guard(&mut self, name: &str) -> bool {
        self.page.claim_guard(name)
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn scroll_y(&self) -> f64 {
        self.scroll_px
    }

    fn viewport_height(&self) -> f64 {
        f64::from(self.viewport_rows) * ROW_PX
    }

    fn max_scroll(&self) -> f64 {
        (self.page.lines.len() as f64 * ROW_PX - self.viewport_height()).max(0.0)
    }

    fn block_top(&self, block: BlockId) -> Result<f64, GeometryError> {
        Ok(self.block_rows(block)? as f64 * ROW_PX)
    }

    fn content_top(&self) -> Result<f64, GeometryError> {
        let block = self
            .page
            .page_container()
            .and_then(|el| el.block)
            .ok_or(GeometryError::MissingContainer(PAGE_CLASS))?;
        let rows = self.block_rows(block)? + self.page.padding_rows;
        Ok(rows as f64 * ROW_PX - self.scroll_px)
    }

    fn popup_scroll_height(&self, popup: &Popup) -> f64 {
        (popup.items.len() + POPUP_CHROME_ROWS) as f64 * ROW_PX
    }

    fn scroll_to(&mut self, y: f64, behavior: ScrollBehavior, now: Instant) {
        let to = y.clamp(0.0, self.max_scroll());
        match behavior {
            ScrollBehavior::Instant => {
                self.animation = None;
                self.scroll_px = to;
            }
            ScrollBehavior::Smooth => {
                self.animation = Some(ScrollAnimation {
                    from: self.scroll_px,
                    to,
                    started: now,
                });
            }
        }
    }

    fn push_fragment(&mut self, fragment: &str) {
        self.fragment = Some(fragment.to_string());
    }

    fn focus_block(&mut self, block: BlockId) {
        self.focused_block = Some(block);
    }
}

/// Everything the pager needs to (re)load a document.
#[derive(Clone, Debug)]
pub struct ViewerOptions {
    pub path: Option<PathBuf>,
    pub title: String,
    pub watch: bool,
    pub overrides: ConfigOverrides,
}

struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
}

#[derive(Clone, Copy, Debug, Default)]
struct HitAreas {
    rail: Option<Rect>,
    popup: Option<Rect>,
    popup_list: Option<Rect>,
    close_button: Option<Rect>,
}

pub struct App {
    options: ViewerOptions,
    syntax_set: SyntaxSet,
    theme: Theme,
    terminal_size: (u16, u16),

    host: TerminalPage,
    tracker: Option<OutlineTracker>,
    offsets: Option<Receiver<OutlineSignal>>,
    outline_top: f64,
    outline_ready: bool,

    areas: HitAreas,
    hover: Option<Surface>,
    popup_list: ListState,

    status: String,
    watcher: Option<FileWatcher>,
    watch_requested: bool,
}

impl App {
    pub fn new(
        options: ViewerOptions,
        page: Page,
        syntax_set: SyntaxSet,
        theme: Theme,
        terminal_size: (u16, u16),
    ) -> Self {
        let rows = Self::content_rows(terminal_size);
        let mut app = Self {
            options,
            syntax_set,
            theme,
            terminal_size,
            host: TerminalPage::new(page, rows),
            tracker: None,
            offsets: None,
            outline_top: 0.0,
            outline_ready: false,
            areas: HitAreas::default(),
            hover: None,
            popup_list: ListState::default(),
            status: String::new(),
            watcher: None,
            watch_requested: false,
        };
        app.install_outline();
        app
    }

    /// Body rows minus the status bar and the content border.
    fn content_rows((_, height): (u16, u16)) -> u16 {
        height.saturating_sub(2).max(1)
    }

    fn viewport(&self) -> Viewport {
        terminal_viewport(self.terminal_size)
    }

    fn install_outline(&mut self) {
        let config = OutlineConfig::resolve(
            self.host.page().config_marker(),
            &self.options.overrides,
            &self.viewport(),
        );
        self.tracker = OutlineTracker::install(&mut self.host, config);
        self.offsets = self.tracker.as_ref().map(|t| t.handle().subscribe());
        self.outline_ready = false;
        self.popup_list = ListState::default();
        self.hover = None;
        self.drain_offsets();
    }

    fn drain_offsets(&mut self) {
        let Some(rx) = self.offsets.as_ref() else {
            return;
        };
        for signal in rx.try_iter() {
            match signal {
                OutlineSignal::Top { top_px } => self.outline_top = top_px,
                OutlineSignal::Ready { top_px } => {
                    self.outline_top = top_px;
                    self.outline_ready = true;
                }
            }
        }
    }

    fn after_manual_scroll(&mut self, now: Instant) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.on_scroll(&mut self.host, now);
        }
    }

    /// Animation frame, timers and the deferred tick, in that order.
    pub fn advance(&mut self, now: Instant) {
        let step = self.host.step(now);
        if let Some(tracker) = self.tracker.as_mut() {
            match step {
                AnimationStep::Idle => {}
                AnimationStep::Moved => tracker.on_scroll(&mut self.host, now),
                AnimationStep::Finished => {
                    tracker.on_scroll(&mut self.host, now);
                    tracker.on_scroll_end(&mut self.host, now);
                }
            }
            tracker.poll(&mut self.host, now);
            tracker.on_frame(&self.host);
        }
        self.drain_offsets();
    }

    /// How long the event loop may block before the next frame or timer.
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        let animating = self.host.is_animating()
            || self.tracker.as_ref().is_some_and(OutlineTracker::frame_pending);
        if animating {
            return FRAME;
        }
        self.tracker
            .as_ref()
            .and_then(OutlineTracker::next_deadline)
            .map_or(IDLE_POLL, |due| {
                due.saturating_duration_since(now).min(IDLE_POLL)
            })
    }

    fn set_doc(&mut self, page: Page) {
        let scroll = self.host.scroll_y();
        let rows = self.host.viewport_rows();
        self.host = TerminalPage::new(page, rows);
        self.host.jump_to(scroll);
        self.install_outline();
    }

    fn reload_current(&mut self) -> Result<()> {
        let Some(path) = self.options.path.clone() else {
            return Ok(());
        };
        let source = fs::read_to_string(&path)
            .with_context(|| format!("Failed to reload {}", path.display()))?;
        let page = render_markdown(&source, &self.options.title, &self.syntax_set, &self.theme);
        self.set_doc(page);
        self.status = format!("Reloaded {}", path.display());
        info!(path = %path.display(), "document reloaded");
        Ok(())
    }

    fn ensure_watcher(&mut self) -> Result<()> {
        if !self.options.watch {
            self.watcher = None;
            return Ok(());
        }
        let Some(path) = self.options.path.clone() else {
            self.watcher = None;
            return Ok(());
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        self.watcher = Some(FileWatcher {
            _watcher: watcher,
            rx,
        });
        Ok(())
    }

    fn poll_watch(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            while let Ok(event) = watcher.rx.try_recv() {
                match event {
                    Ok(_) => self.watch_requested = true,
                    Err(err) => warn!(error = %err, "file watcher error"),
                }
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let root = inset_rect(frame.size(), 1, 0);
        let chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).split(root);
        let body = chunks[0];
        let status = inset_rect(chunks[1], 1, 0);

        let cols = Layout::horizontal([Constraint::Min(1), Constraint::Length(RAIL_WIDTH)])
            .split(body);
        let content_block = Block::default()
            .title(" outline-rail ")
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray))
            .padding(Padding::new(1, 1, 0, 0));
        let content = content_block.inner(cols[0]);

        self.areas = HitAreas::default();
        self.draw_content(frame, cols[0], content_block);

        let viewport_top = content.y;
        let rail_column = Rect {
            y: viewport_top,
            height: content.height,
            ..cols[1]
        };
        self.draw_rail(frame, rail_column);
        self.draw_popup(frame, body, rail_column);
        self.draw_status(frame, status);
    }

    fn draw_content(&self, frame: &mut ratatui::Frame<'_>, area: Rect, block: Block<'_>) {
        let focused_line = self
            .host
            .focused_block()
            .and_then(|b| self.host.page().block(b))
            .map(|layout| layout.top_line);

        let lines: Vec<Line> = self
            .host
            .page()
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                let gutter = if focused_line == Some(idx) {
                    Span::styled("▌ ", Style::default().fg(Color::Yellow))
                } else {
                    Span::raw("  ")
                };
                let mut spans = vec![gutter];
                spans.extend(
                    line.segments
                        .iter()
                        .map(|segment| Span::styled(segment.text.clone(), segment.style)),
                );
                Line::from(spans)
            })
            .collect();

        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .scroll((usize_to_u16_saturating(self.host.top_row()), 0));
        frame.render_widget(paragraph, area);
    }

    fn draw_rail(&mut self, frame: &mut ratatui::Frame<'_>, column: Rect) {
        let Some(tracker) = self.tracker.as_ref() else {
            return;
        };
        let rail = &tracker.surfaces().rail;
        if rail.hidden || rail.bars.is_empty() {
            return;
        }

        let offset = px_to_rows(self.outline_top).min(column.height.saturating_sub(1));
        let y = column.y.saturating_add(offset);
        let height = usize_to_u16_saturating(rail.bars.len())
            .min(column.height.saturating_sub(offset));
        let area = Rect { y, height, ..column };
        self.areas.rail = Some(area);

        let focused = tracker.rail_focused();
        let lines: Vec<Line> = rail
            .bars
            .iter()
            .map(|bar| {
                let glyph = match bar.level {
                    1 => "━━━",
                    2 => " ━━",
                    _ => "  ─",
                };
                let mut style = Style::default().fg(Color::DarkGray);
                if bar.active {
                    style = style.fg(Color::Yellow).add_modifier(Modifier::BOLD);
                }
                if focused {
                    style = style.bg(Color::Rgb(40, 40, 40));
                }
                Line::styled(glyph, style)
            })
            .collect();
        frame.render_widget(Paragraph::new(Text::from(lines)), area);
    }

    fn draw_popup(&mut self, frame: &mut ratatui::Frame<'_>, body: Rect, rail: Rect) {
        let Some(tracker) = self.tracker.as_ref() else {
            return;
        };
        let popup = &tracker.surfaces().popup;
        if !popup.open || popup.hidden {
            return;
        }

        let area = if tracker.config().mobile_popup {
            body
        } else {
            let width = POPUP_MAX_WIDTH.min(body.width.saturating_sub(RAIL_WIDTH + 2));
            let (top_px, height_px) = match popup.locked {
                Some(locked) => (locked.top, locked.height),
                None => (
                    self.outline_top,
                    self.host.popup_scroll_height(popup),
                ),
            };
            let y = rail.y.saturating_add(px_to_rows(top_px));
            let bottom = body.y.saturating_add(body.height);
            let height = px_to_rows(height_px).min(bottom.saturating_sub(y));
            Rect {
                x: rail.x.saturating_sub(width),
                y,
                width,
                height,
            }
        };
        if area.height < 3 || area.width < 6 {
            return;
        }

        let close = Rect {
            x: area.x + area.width - 4,
            y: area.y,
            width: 3,
            height: 1,
        };
        let block = Block::default()
            .title(" Contents ")
            .title(Title::from("[×]").alignment(ratatui::layout::Alignment::Right))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Gray));
        let list_area = block.inner(area);

        let items: Vec<ListItem> = popup
            .items
            .iter()
            .map(|item| {
                let indent = "  ".repeat(item.level.saturating_sub(1) as usize);
                let base = if item.active {
                    Style::default().fg(Color::Yellow).bold()
                } else {
                    Style::default()
                };
                let mut spans = vec![Span::styled(indent, base)];
                spans.extend(markup_spans(item.title_markup.nodes(), base));
                if spans.len() == 1 {
                    spans.push(Span::styled(item.title.clone(), base));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        self.popup_list.select(tracker.popup_focus());
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        frame.render_widget(Clear, area);
        frame.render_stateful_widget(list, area, &mut self.popup_list);
        self.areas.popup = Some(area);
        self.areas.popup_list = Some(list_area);
        self.areas.close_button = Some(close);
    }

    fn draw_status(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let path = self
            .options
            .path
            .as_ref()
            .map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());
        let fragment = self
            .host
            .fragment()
            .map_or_else(String::new, |f| format!(" #{f}"));
        let heading = self
            .tracker
            .as_ref()
            .and_then(|t| t.active_index().and_then(|i| t.index().get(i)))
            .map_or_else(
                || "no outline".to_string(),
                |h| format!("§ {}", h.title),
            );
        let ready = if self.outline_ready { "" } else { " (pending)" };
        let watch_hint = if self.options.watch { " watch:on" } else { "" };

        let mut status_text =
            format!("{path}{fragment} | {heading} | top {}px{ready}{watch_hint}", self.outline_top);
        if !self.status.is_empty() {
            status_text.push_str(" | ");
            status_text.push_str(&self.status);
        }
        frame.render_widget(
            Paragraph::new(format!(" {status_text}")).style(Style::default().fg(Color::Gray)),
            area,
        );
    }

    fn surface_at(&self, column: u16, row: u16) -> Option<Surface> {
        let open = self.tracker.as_ref().is_some_and(OutlineTracker::is_open);
        if open && self.areas.popup.is_some_and(|a| hit(a, column, row)) {
            return Some(Surface::Popup);
        }
        if self.areas.rail.is_some_and(|a| hit(a, column, row)) {
            return Some(Surface::Rail);
        }
        None
    }

    fn popup_item_at(&self, row: u16) -> Option<usize> {
        let list = self.areas.popup_list?;
        if row < list.y || row >= list.y.saturating_add(list.height) {
            return None;
        }
        let idx = self.popup_list.offset() + usize::from(row - list.y);
        let len = self.tracker.as_ref()?.index().len();
        (idx < len).then_some(idx)
    }

    fn update_hover(&mut self, column: u16, row: u16, now: Instant) {
        let next = self.surface_at(column, row);
        if next == self.hover {
            return;
        }
        let previous = std::mem::replace(&mut self.hover, next);
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };
        if let Some(surface) = previous {
            tracker.on_disclosure(
                &self.host,
                DisclosureEvent::PointerLeave(surface, PointerKind::Mouse),
                now,
            );
        }
        if let Some(surface) = next {
            tracker.on_disclosure(
                &self.host,
                DisclosureEvent::PointerEnter(surface, PointerKind::Mouse),
                now,
            );
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent, now: Instant) {
        let (column, row) = (mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => self.update_hover(column, row, now),
            MouseEventKind::Down(MouseButton::Left) => {
                self.update_hover(column, row, now);
                self.click(column, row, now);
            }
            MouseEventKind::ScrollDown => self.wheel(column, row, 3, now),
            MouseEventKind::ScrollUp => self.wheel(column, row, -3, now),
            _ => {}
        }
    }

    fn click(&mut self, column: u16, row: u16, now: Instant) {
        let over_close = self.areas.close_button.is_some_and(|a| hit(a, column, row));
        let in_list = self.areas.popup_list.is_some_and(|a| hit(a, column, row));
        let item = self.popup_item_at(row).filter(|_| in_list);
        let surface = self.surface_at(column, row);
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };
        match surface {
            Some(Surface::Popup) if over_close => {
                tracker.on_disclosure(&self.host, DisclosureEvent::CloseButton, now);
            }
            Some(Surface::Popup) => {
                if let Some(idx) = item {
                    tracker.activate_entry(&mut self.host, idx, Activation::Pointer, now);
                }
            }
            Some(Surface::Rail) => {
                tracker.on_disclosure(&self.host, DisclosureEvent::RailClick, now);
            }
            None if tracker.popup_focus().is_some() => {
                tracker.on_disclosure(&self.host, DisclosureEvent::FocusOut, now);
            }
            None => {}
        }
    }

    fn wheel(&mut self, column: u16, row: u16, rows: isize, now: Instant) {
        if self.surface_at(column, row) == Some(Surface::Popup) {
            let Some(tracker) = self.tracker.as_ref() else {
                return;
            };
            if tracker.popup_traps_wheel(&self.host) {
                return;
            }
            let len = tracker.index().len();
            let visible = self.areas.popup_list.map_or(0, |a| usize::from(a.height));
            let max_offset = len.saturating_sub(visible);
            let offset = self.popup_list.offset().saturating_add_signed(rows).min(max_offset);
            *self.popup_list.offset_mut() = offset;
            return;
        }
        if self.host.scroll_rows(rows) {
            self.after_manual_scroll(now);
        }
    }

    fn handle_resize(&mut self, width: u16, height: u16) {
        self.terminal_size = (width, height);
        self.host.set_viewport_rows(Self::content_rows(self.terminal_size));
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.on_resize(&self.host);
        }
        debug!(width, height, "terminal resized");
    }

    fn handle_popup_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        let Some(tracker) = self.tracker.as_mut() else {
            return false;
        };
        if !tracker.is_open() || tracker.popup_focus().is_none() {
            return false;
        }
        let popup_key = match key.code {
            KeyCode::Up | KeyCode::Char('k') => PopupKey::Up,
            KeyCode::Down | KeyCode::Char('j') => PopupKey::Down,
            KeyCode::Esc => PopupKey::Escape,
            KeyCode::Enter | KeyCode::Char(' ') => PopupKey::Activate,
            _ => return false,
        };
        tracker.on_popup_key(&mut self.host, popup_key, now);
        true
    }

    fn handle_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        if self.handle_popup_key(key, now) {
            return false;
        }

        let half_page = (self.host.viewport_rows() / 2).max(1) as isize;
        let scrolled = match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('j') | KeyCode::Down => self.host.scroll_rows(1),
            KeyCode::Char('k') | KeyCode::Up => self.host.scroll_rows(-1),
            KeyCode::Char('g') => self.host.jump_to(0.0),
            KeyCode::Char('G') => self.host.jump_to(f64::INFINITY),
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.host.scroll_rows(half_page)
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.host.scroll_rows(-half_page)
            }
            KeyCode::Char(']') => {
                self.navigate_relative(1, now);
                false
            }
            KeyCode::Char('[') => {
                self.navigate_relative(-1, now);
                false
            }
            KeyCode::Char('t') => {
                self.toggle_outline(now);
                false
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.cycle_popup_focus(now);
                false
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                let rail_focused = self.tracker.as_ref().is_some_and(OutlineTracker::rail_focused);
                if rail_focused {
                    self.disclose(DisclosureEvent::RailKeyActivate, now);
                }
                false
            }
            KeyCode::Esc => {
                self.disclose(DisclosureEvent::Escape, now);
                false
            }
            _ => false,
        };
        if scrolled {
            self.after_manual_scroll(now);
        }
        false
    }

    fn disclose(&mut self, event: DisclosureEvent, now: Instant) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.on_disclosure(&self.host, event, now);
        }
    }

    /// Tab moves keyboard focus into the popup list, or back out to the page.
    fn cycle_popup_focus(&mut self, now: Instant) {
        let Some(tracker) = self.tracker.as_ref() else {
            return;
        };
        let event = if tracker.popup_focus().is_some() {
            DisclosureEvent::FocusOut
        } else {
            DisclosureEvent::FocusIn
        };
        self.disclose(event, now);
    }

    fn toggle_outline(&mut self, now: Instant) {
        let Some(tracker) = self.tracker.as_ref() else {
            self.status = "Outline unavailable".to_string();
            return;
        };
        if tracker.surfaces().is_hidden() {
            self.status = format!(
                "Outline needs at least {} headings",
                tracker.config().min_items
            );
            return;
        }
        let event = if tracker.is_open() {
            DisclosureEvent::Escape
        } else {
            DisclosureEvent::RailKeyActivate
        };
        self.disclose(event, now);
    }

    fn navigate_relative(&mut self, delta: isize, now: Instant) {
        match self.tracker.as_mut() {
            Some(tracker) if !tracker.index().is_empty() => {
                tracker.navigate_relative(&mut self.host, delta, now);
            }
            _ => self.status = "No headings in outline".to_string(),
        }
    }
}

/// Styled spans for sanitized title markup.
fn markup_spans(nodes: &[Node], base: Style) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for node in nodes {
        match node {
            Node::Text(text) => spans.push(Span::styled(text.clone(), base)),
            Node::Element(el) => {
                let style = match el.tag.as_str() {
                    "b" | "strong" => base.add_modifier(Modifier::BOLD),
                    "i" | "em" => base.add_modifier(Modifier::ITALIC),
                    "mark" => base.bg(Color::Rgb(90, 80, 20)),
                    "del" | "s" => base.add_modifier(Modifier::CROSSED_OUT),
                    "ins" => base.add_modifier(Modifier::UNDERLINED),
                    "small" | "sub" | "sup" => base.add_modifier(Modifier::DIM),
                    _ => base,
                };
                spans.extend(markup_spans(&el.children, style));
            }
        }
    }
    spans
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        io::stdout()
            .execute(EnterAlternateScreen)
            .context("Failed to enter alternate screen")?;
        io::stdout()
            .execute(EnableMouseCapture)
            .context("Failed to enable mouse capture")?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
    }
}

pub fn run_interactive(mut app: App) -> Result<()> {
    let _guard = TerminalGuard::enter()?;
    app.ensure_watcher()?;

    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    loop {
        app.advance(Instant::now());
        terminal.draw(|frame| app.draw(frame))?;

        if app.watch_requested {
            if let Err(err) = app.reload_current() {
                warn!(error = %err, "reload failed");
                app.status = format!("Reload failed: {err:#}");
            }
            app.watch_requested = false;
        }

        app.poll_watch();

        if event::poll(app.poll_timeout(Instant::now()))? {
            let now = Instant::now();
            match event::read()? {
                CEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key, now) {
                        break;
                    }
                }
                CEvent::Mouse(mouse) => app.handle_mouse(mouse, now),
                CEvent::Resize(width, height) => app.handle_resize(width, height),
                _ => {}
            }
        }
    }

    Ok(())
}
