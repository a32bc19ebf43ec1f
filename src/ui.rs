use std::collections::HashSet;
use std::io::{self, Stdout};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, window_size, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::capture::{CaptureDevice, CaptureRequest, ReplyArtifact};
use crate::catalog::{Catalog, Short};
use crate::clip::{PlaybackController, Player, PlayerEvent};
use crate::feed::{self as nav, FeedNavigator, GestureConfig};
use crate::logging::debug_log;
use crate::reply::{ReplyFlow, ReplyStep};
use crate::tier::{EntitlementStore, Tier};
use crate::video::{self, PreviewSession};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const PHONE_WIDTH: u16 = 46;
const PHONE_HEIGHT: u16 = 34;
const ACTION_COLUMN_WIDTH: u16 = 11;
const ARROW_COLUMN_WIDTH: u16 = 5;
const MAX_LISTED_RESPONSES: usize = 3;
/// Vertical delta reported for one scroll-wheel notch.
const WHEEL_NOTCH_DELTA: f64 = 100.0;
/// Assumed cell height when the terminal does not report its pixel size.
const FALLBACK_CELL_HEIGHT_PX: f64 = 16.0;

const ICON_SOUND_ON: &str = "🔊";
const ICON_SOUND_OFF: &str = "🔇";
const ICON_LIKE: &str = "♥";
const ICON_COMMENTS: &str = "✉";
const ICON_REPLY: &str = "↩";
const ICON_SHARE: &str = "⇪";

#[derive(Clone, Copy)]
struct CellMetrics {
    height: f64,
}

fn terminal_cell_metrics() -> CellMetrics {
    static METRICS: OnceLock<CellMetrics> = OnceLock::new();
    *METRICS.get_or_init(|| {
        let height = window_size()
            .ok()
            .filter(|size| size.height > 0 && size.rows > 0)
            .map(|size| f64::from(size.height) / f64::from(size.rows))
            .unwrap_or(FALLBACK_CELL_HEIGHT_PX);
        CellMetrics { height }
    })
}

fn row_to_px(row: u16) -> f64 {
    f64::from(row) * terminal_cell_metrics().height
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

/// Phone-shaped frame centred in `area`, shrunk to fit small terminals.
fn phone_rect(area: Rect) -> Rect {
    let width = PHONE_WIDTH.min(area.width);
    let height = PHONE_HEIGHT.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

/// Compact engagement count: `1.2M`, `12.4K`, or the plain number.
pub fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1e6)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1e3)
    } else {
        n.to_string()
    }
}

fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn pluralize(count: usize, singular: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {singular}s")
    }
}

fn wrap_lines(text: &str, width: u16, style: Style) -> Vec<Line<'static>> {
    let width = usize::from(width.max(1));
    wrap(text, WrapOptions::new(width))
        .into_iter()
        .map(|line| Line::from(Span::styled(line.into_owned(), style)))
        .collect()
}

/// Screen regions captured during the last draw, used for mouse hit-testing.
#[derive(Default, Clone, Copy)]
struct HitAreas {
    slide: Rect,
    prev_arrow: Rect,
    next_arrow: Rect,
    dots: Rect,
    dots_start: u16,
    mute: Rect,
    like: Rect,
    reply: Rect,
    share: Rect,
    preview_close: Rect,
    modal: Rect,
    modal_close: Rect,
    modal_tiers: [Rect; 3],
    modal_action: Rect,
}

struct ReplyPreview {
    artifact: ReplyArtifact,
    session: Option<PreviewSession>,
}

pub struct Options {
    pub store: EntitlementStore,
    pub catalog: Catalog,
    pub gestures: GestureConfig,
    pub player: Box<dyn Player>,
    pub player_events: Option<Receiver<PlayerEvent>>,
    pub media_root: String,
    pub start_muted: bool,
    pub capture: Arc<dyn CaptureDevice>,
    pub capture_request: CaptureRequest,
    /// mpv binary used to loop a recorded reply; `None` disables the preview
    /// window.
    pub preview_player: Option<String>,
    pub status_message: String,
}

pub struct Model {
    store: EntitlementStore,
    catalog: Catalog,
    feed_ids: Vec<String>,
    nav: FeedNavigator,
    playback: PlaybackController<Box<dyn Player>>,
    player_events: Option<Receiver<PlayerEvent>>,
    capture: Arc<dyn CaptureDevice>,
    capture_request: CaptureRequest,
    preview_player: Option<String>,
    reply: Option<ReplyFlow>,
    preview: Option<ReplyPreview>,
    liked: HashSet<String>,
    status_message: String,
    needs_redraw: bool,
    hits: HitAreas,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let feed_ids = opts.catalog.feed_ids();
        let nav = FeedNavigator::new(feed_ids.len(), opts.gestures);
        let playback = PlaybackController::new(opts.player, opts.media_root, opts.start_muted);
        let mut model = Self {
            store: opts.store,
            catalog: opts.catalog,
            feed_ids,
            nav,
            playback,
            player_events: opts.player_events,
            capture: opts.capture,
            capture_request: opts.capture_request,
            preview_player: opts.preview_player,
            reply: None,
            preview: None,
            liked: HashSet::new(),
            status_message: opts.status_message,
            needs_redraw: true,
            hits: HitAreas::default(),
        };
        if let Err(err) = model.sync_playback() {
            model.status_message = format!("Playback unavailable: {err}");
        }
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        self.shutdown();
        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = self.handle_mouse(mouse) {
                            self.status_message = format!("Error: {}", err);
                            self.mark_dirty();
                        }
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                // The countdown is wall-clock driven; keep it repainting.
                if self.reply.as_ref().is_some_and(ReplyFlow::is_recording) {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn shutdown(&mut self) {
        if let Some(mut flow) = self.reply.take() {
            flow.close();
        }
        self.preview = None;
        let _ = self.playback.deactivate();
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;

        if let Some(rx) = self.player_events.as_ref() {
            let events = video::drain_events(rx);
            for event in events {
                changed = true;
                if event == PlayerEvent::Exited {
                    debug_log("player exited");
                    self.player_events = None;
                    self.status_message = "Player window closed.".to_string();
                }
                if let Err(err) = self.playback.handle(event) {
                    self.status_message = format!("Playback error: {err}");
                }
            }
        }

        if let Some(flow) = self.reply.as_mut() {
            let before = (flow.step(), flow.device_live(), flow.error().map(str::to_string));
            if let Some(artifact) = flow.poll(&mut self.store) {
                self.show_preview(artifact);
                changed = true;
            }
            if let Some(flow) = self.reply.as_ref() {
                let after = (flow.step(), flow.device_live(), flow.error().map(str::to_string));
                changed |= before != after;
            }
        }

        changed
    }

    fn active_short(&self) -> Option<&Short> {
        self.feed_ids
            .get(self.nav.index())
            .and_then(|id| self.catalog.get(id))
    }

    fn sync_playback(&mut self) -> Result<()> {
        let short = self
            .feed_ids
            .get(self.nav.index())
            .and_then(|id| self.catalog.get(id));
        match short {
            Some(short) => self.playback.activate(short),
            None => self.playback.deactivate(),
        }
    }

    fn after_navigation(&mut self, moved: bool) -> Result<()> {
        if moved {
            self.sync_playback()?;
            self.mark_dirty();
        }
        Ok(())
    }

    fn toggle_mute(&mut self) -> Result<()> {
        let muted = !self.playback.muted();
        self.playback.set_muted(muted)?;
        self.status_message = if muted { "Muted." } else { "Sound on." }.to_string();
        self.mark_dirty();
        Ok(())
    }

    fn toggle_like(&mut self) {
        let Some(id) = self.active_short().map(|short| short.id.clone()) else {
            return;
        };
        if !self.liked.remove(&id) {
            self.liked.insert(id);
        }
        self.mark_dirty();
    }

    fn open_reply(&mut self) -> Result<()> {
        if self.reply.is_some() {
            return Ok(());
        }
        let Some(parent_id) = self.active_short().map(|short| short.id.clone()) else {
            return Ok(());
        };
        self.playback.set_muted(true)?;
        self.reply = Some(ReplyFlow::open(
            parent_id,
            &self.store,
            self.capture_request.clone(),
        ));
        self.mark_dirty();
        Ok(())
    }

    fn close_reply(&mut self) {
        if let Some(mut flow) = self.reply.take() {
            flow.close();
        }
        self.mark_dirty();
    }

    fn select_tier(&mut self, tier: Tier) {
        let Some(flow) = self.reply.as_mut() else {
            return;
        };
        if flow.select_tier(tier, &mut self.store) {
            self.status_message = format!(
                "Switched to {} ({}).",
                tier.policy().label,
                tier.policy().allowance_label()
            );
            self.mark_dirty();
        }
    }

    fn reply_action(&mut self) {
        let Some(flow) = self.reply.as_mut() else {
            return;
        };
        match flow.step() {
            ReplyStep::Record => {
                flow.start_recording(&self.store, self.capture.clone(), Instant::now());
                self.mark_dirty();
            }
            ReplyStep::Success => self.close_reply(),
            ReplyStep::Upgrade | ReplyStep::Capturing => {}
        }
    }

    fn show_preview(&mut self, artifact: ReplyArtifact) {
        let session = self.preview_player.as_deref().and_then(|mpv| {
            match PreviewSession::spawn(mpv, artifact.path()) {
                Ok(session) => Some(session),
                Err(err) => {
                    debug_log(format!("preview: {err:#}"));
                    None
                }
            }
        });
        self.status_message = format!(
            "Reply recorded ({:.1}s). Press x to dismiss the preview.",
            artifact.duration().as_secs_f64()
        );
        // Replacing the old preview drops its artifact and window.
        self.preview = Some(ReplyPreview { artifact, session });
    }

    fn dismiss_preview(&mut self) {
        if let Some(preview) = self.preview.take() {
            if let Some(session) = preview.session {
                session.stop();
            }
            self.mark_dirty();
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.reply.is_some() {
            return self.handle_modal_key(code);
        }

        let now = Instant::now();
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(true),
            KeyCode::Up | KeyCode::Char('k') => {
                let moved = self.nav.key(nav::Direction::Prev, false, now);
                self.after_navigation(moved)?;
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let moved = self.nav.key(nav::Direction::Next, false, now);
                self.after_navigation(moved)?;
            }
            KeyCode::PageUp => {
                let moved = self.nav.button(nav::Direction::Prev);
                self.after_navigation(moved)?;
            }
            KeyCode::PageDown => {
                let moved = self.nav.button(nav::Direction::Next);
                self.after_navigation(moved)?;
            }
            KeyCode::Char(ch @ '1'..='9') => {
                let index = usize::from(ch as u8 - b'1');
                let moved = self.nav.jump(index);
                self.after_navigation(moved)?;
            }
            KeyCode::Char('m') | KeyCode::Char('M') => self.toggle_mute()?,
            KeyCode::Char('l') | KeyCode::Char('L') => self.toggle_like(),
            KeyCode::Char('r') | KeyCode::Char('R') => self.open_reply()?,
            KeyCode::Char('x') | KeyCode::Char('X') => self.dismiss_preview(),
            _ => {}
        }
        Ok(false)
    }

    fn handle_modal_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(true),
            KeyCode::Esc => self.close_reply(),
            KeyCode::Char(ch @ '1'..='3') => {
                let tier = Tier::ALL[usize::from(ch as u8 - b'1')];
                self.select_tier(tier);
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.reply_action(),
            _ => {}
        }
        Ok(false)
    }

    fn handle_mouse(&mut self, event: MouseEvent) -> Result<()> {
        let (column, row) = (event.column, event.row);
        if self.reply.is_some() {
            if let MouseEventKind::Down(MouseButton::Left) = event.kind {
                self.handle_modal_click(column, row);
            }
            return Ok(());
        }

        let now = Instant::now();
        match event.kind {
            MouseEventKind::ScrollDown => {
                let moved = self.nav.wheel(WHEEL_NOTCH_DELTA, now);
                self.after_navigation(moved)?;
            }
            MouseEventKind::ScrollUp => {
                let moved = self.nav.wheel(-WHEEL_NOTCH_DELTA, now);
                self.after_navigation(moved)?;
            }
            MouseEventKind::Down(MouseButton::Left) => {
                if !self.handle_click(column, row)? && contains(self.hits.slide, column, row) {
                    self.nav.begin_drag(row_to_px(row));
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                let moved = self.nav.end_drag(row_to_px(row), now);
                self.after_navigation(moved)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Explicit on-screen controls. Returns true when a control was hit.
    fn handle_click(&mut self, column: u16, row: u16) -> Result<bool> {
        let hits = self.hits;
        if contains(hits.prev_arrow, column, row) {
            let moved = self.nav.button(nav::Direction::Prev);
            self.after_navigation(moved)?;
        } else if contains(hits.next_arrow, column, row) {
            let moved = self.nav.button(nav::Direction::Next);
            self.after_navigation(moved)?;
        } else if contains(hits.dots, column, row) {
            let offset = column.saturating_sub(hits.dots_start);
            if column >= hits.dots_start && offset % 2 == 0 {
                let moved = self.nav.jump(usize::from(offset / 2));
                self.after_navigation(moved)?;
            }
        } else if contains(hits.preview_close, column, row) {
            self.dismiss_preview();
        } else if contains(hits.mute, column, row) {
            self.toggle_mute()?;
        } else if contains(hits.like, column, row) {
            self.toggle_like();
        } else if contains(hits.reply, column, row) {
            self.open_reply()?;
        } else if contains(hits.share, column, row) {
            self.status_message = "Sharing is not available in this demo.".to_string();
            self.mark_dirty();
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    fn handle_modal_click(&mut self, column: u16, row: u16) {
        let hits = self.hits;
        if !contains(hits.modal, column, row) || contains(hits.modal_close, column, row) {
            self.close_reply();
            return;
        }
        if let Some(pos) = hits
            .modal_tiers
            .iter()
            .position(|area| contains(*area, column, row))
        {
            self.select_tier(Tier::ALL[pos]);
        } else if contains(hits.modal_action, column, row) {
            self.reply_action();
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);
        self.hits = HitAreas::default();

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        self.draw_tier_bar(frame, layout[0]);

        let phone = phone_rect(layout[1]);
        self.draw_phone(frame, phone);

        let arrows = Rect {
            x: phone.x.saturating_add(phone.width).saturating_add(1),
            y: phone.y,
            width: ARROW_COLUMN_WIDTH,
            height: phone.height,
        };
        if arrows.x.saturating_add(arrows.width) <= layout[1].x + layout[1].width {
            self.draw_arrows(frame, arrows);
        }

        let footer_text = if self.status_message.is_empty() {
            self.footer_hints()
        } else {
            self.status_message.clone()
        };
        let footer = Paragraph::new(footer_text)
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);

        if self.reply.is_some() {
            self.draw_reply_modal(frame, phone);
        }
    }

    fn footer_hints(&self) -> String {
        if self.reply.is_some() {
            "1-3 plan · Enter start/done · Esc close · q quit".to_string()
        } else {
            "↑/↓ swipe · PgUp/PgDn step · 1-9 jump · m mute · l like · r reply · x close preview · q quit"
                .to_string()
        }
    }

    fn draw_tier_bar(&self, frame: &mut Frame<'_>, area: Rect) {
        let policy = self.store.tier().policy();
        let viewer = self.store.viewer();
        let left = format!(
            " {} · {}",
            policy.label,
            self.store.credits().bar_label()
        );
        let right = format!("{} ", viewer.handle);
        let gap = usize::from(area.width)
            .saturating_sub(left.width())
            .saturating_sub(right.width());
        let line = Line::from(vec![
            Span::styled(
                left,
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" ".repeat(gap)),
            Span::styled(right, Style::default().fg(COLOR_TEXT_SECONDARY)),
        ]);
        let bar = Paragraph::new(line).style(Style::default().bg(COLOR_PANEL_FOCUSED_BG));
        frame.render_widget(bar, area);
    }

    fn draw_phone(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
            .title(Span::styled(
                " Shorts ",
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .style(Style::default().bg(COLOR_PANEL_BG));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(6),
                Constraint::Length(6),
                Constraint::Length(1),
            ])
            .split(inner);
        self.hits.slide = Rect {
            height: sections[0].height + sections[1].height,
            ..sections[0]
        };

        let Some(short) = self.active_short().cloned() else {
            let empty = Paragraph::new("No shorts in the catalog.")
                .style(Style::default().fg(COLOR_TEXT_SECONDARY))
                .alignment(Alignment::Center);
            frame.render_widget(empty, sections[0]);
            return;
        };

        let upper = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(ACTION_COLUMN_WIDTH)])
            .split(sections[0]);
        self.draw_video(frame, upper[0], &short);
        self.draw_actions(frame, upper[1], &short);
        self.draw_info(frame, sections[1], &short);
        self.draw_dots(frame, sections[2]);

        if self.preview.is_some() {
            self.draw_preview(frame, upper[0]);
        }
    }

    fn draw_video(&self, frame: &mut Frame<'_>, area: Rect, short: &Short) {
        let playing = self.playback.is_playing();
        let mut lines = vec![
            Line::default(),
            Line::from(Span::styled(
                if playing { "▶  Playing" } else { "⏸  Paused" },
                Style::default()
                    .fg(if playing { COLOR_SUCCESS } else { COLOR_TEXT_SECONDARY })
                    .add_modifier(Modifier::BOLD),
            )),
            Line::default(),
        ];
        let body = Style::default().fg(COLOR_TEXT_PRIMARY);
        lines.extend(wrap_lines(&short.title, area.width.saturating_sub(2), body));
        lines.push(Line::default());

        let detail = Style::default().fg(COLOR_TEXT_SECONDARY);
        lines.push(Line::from(Span::styled(
            format!("{}s short", short.duration_secs),
            detail,
        )));
        if let Some(window) = self.playback.window() {
            if short.clip.is_configured() {
                lines.push(Line::from(Span::styled(
                    format!(
                        "Clip {} to {}",
                        format_clock(window.start),
                        format_clock(window.end)
                    ),
                    detail,
                )));
            }
        }
        if let Some(position) = self.playback.position() {
            lines.push(Line::from(Span::styled(
                format!("at {}", format_clock(position)),
                detail,
            )));
        }

        let video = Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(COLOR_BORDER_IDLE))
                    .style(Style::default().bg(COLOR_BG)),
            );
        frame.render_widget(video, area);
    }

    fn draw_actions(&mut self, frame: &mut Frame<'_>, area: Rect, short: &Short) {
        let muted = self.playback.muted();
        let liked = self.liked.contains(&short.id);
        let like_count = short.like_count + u64::from(liked);

        let mut rows: Vec<(Vec<Line<'static>>, Option<&mut Rect>)> = Vec::new();
        let sound = Style::default().fg(COLOR_TEXT_PRIMARY);
        rows.push((
            vec![
                Line::from(Span::styled(
                    if muted { ICON_SOUND_OFF } else { ICON_SOUND_ON },
                    sound,
                )),
                Line::from(Span::styled(if muted { "Off" } else { "On" }, sound)),
            ],
            Some(&mut self.hits.mute),
        ));
        let like_style = if liked {
            Style::default().fg(COLOR_ERROR).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_PRIMARY)
        };
        rows.push((
            vec![
                Line::from(Span::styled(ICON_LIKE, like_style)),
                Line::from(Span::styled(format_count(like_count), like_style)),
            ],
            Some(&mut self.hits.like),
        ));
        rows.push((
            vec![
                Line::from(Span::styled(ICON_COMMENTS, sound)),
                Line::from(Span::styled(format_count(short.comment_count), sound)),
            ],
            None,
        ));
        let reply_style = Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD);
        rows.push((
            vec![
                Line::from(Span::styled(
                    format!("{ICON_REPLY} {}", format_count(short.reply_count)),
                    reply_style,
                )),
                Line::from(Span::styled("Reply", reply_style)),
            ],
            Some(&mut self.hits.reply),
        ));
        rows.push((
            vec![
                Line::from(Span::styled(ICON_SHARE, sound)),
                Line::from(Span::styled("Share", sound)),
            ],
            Some(&mut self.hits.share),
        ));

        let mut y = area.y + 1;
        let bottom = area.y + area.height;
        for (lines, hit) in rows {
            let height = lines.len() as u16;
            if y + height > bottom {
                break;
            }
            let cell = Rect {
                x: area.x,
                y,
                width: area.width,
                height,
            };
            frame.render_widget(
                Paragraph::new(Text::from(lines)).alignment(Alignment::Center),
                cell,
            );
            if let Some(hit) = hit {
                *hit = cell;
            }
            y += height + 1;
        }
    }

    fn draw_info(&self, frame: &mut Frame<'_>, area: Rect, short: &Short) {
        let width = area.width.saturating_sub(2);
        let mut lines = vec![Line::from(vec![
            Span::styled(
                short.creator.handle.clone(),
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {}", short.creator.display_name),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        ])];
        lines.extend(wrap_lines(
            &short.title,
            width,
            Style::default().fg(COLOR_TEXT_PRIMARY),
        ));
        if let Some(description) = short.description.as_deref() {
            lines.extend(wrap_lines(
                description,
                width,
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        }
        if let Some(music) = short.music_label.as_deref() {
            lines.push(Line::from(Span::styled(
                format!("♫ {music}"),
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .add_modifier(Modifier::ITALIC),
            )));
        }
        let info = Paragraph::new(Text::from(lines))
            .block(Block::default().borders(Borders::NONE))
            .wrap(Wrap { trim: true });
        frame.render_widget(
            info,
            Rect {
                x: area.x + 1,
                width,
                ..area
            },
        );
    }

    fn draw_dots(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let count = self.feed_ids.len();
        if count == 0 {
            return;
        }
        let spans: Vec<Span<'static>> = (0..count)
            .flat_map(|i| {
                let active = i == self.nav.index();
                let dot = Span::styled(
                    if active { "●" } else { "○" },
                    Style::default().fg(if active {
                        COLOR_ACCENT
                    } else {
                        COLOR_TEXT_SECONDARY
                    }),
                );
                if i + 1 < count {
                    vec![dot, Span::raw(" ")]
                } else {
                    vec![dot]
                }
            })
            .collect();
        let used = (count * 2 - 1) as u16;
        let start = area.x + area.width.saturating_sub(used) / 2;
        self.hits.dots = Rect {
            x: start,
            width: used.min(area.width),
            ..area
        };
        self.hits.dots_start = start;
        frame.render_widget(
            Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
            area,
        );
    }

    fn draw_arrows(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let middle = area.y + area.height / 2;
        let button = |enabled: bool| {
            Style::default()
                .fg(if enabled {
                    COLOR_TEXT_PRIMARY
                } else {
                    COLOR_BORDER_IDLE
                })
                .bg(if enabled {
                    COLOR_PANEL_SELECTED_BG
                } else {
                    COLOR_PANEL_BG
                })
                .add_modifier(Modifier::BOLD)
        };
        let up = Rect {
            x: area.x,
            y: middle.saturating_sub(2),
            width: area.width,
            height: 1,
        };
        let down = Rect {
            y: middle + 1,
            ..up
        };
        frame.render_widget(
            Paragraph::new("▲")
                .alignment(Alignment::Center)
                .style(button(!self.nav.at_start())),
            up,
        );
        frame.render_widget(
            Paragraph::new("▼")
                .alignment(Alignment::Center)
                .style(button(!self.nav.at_end())),
            down,
        );
        self.hits.prev_arrow = up;
        self.hits.next_arrow = down;
    }

    fn draw_preview(&mut self, frame: &mut Frame<'_>, video: Rect) {
        let Some(preview) = self.preview.as_ref() else {
            return;
        };
        let width = video.width.saturating_sub(4).min(30);
        let area = Rect {
            x: video.x + 2,
            y: (video.y + video.height).saturating_sub(5),
            width,
            height: 4.min(video.height),
        };
        frame.render_widget(Clear, area);

        let name = preview
            .artifact
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let looping = if preview.session.is_some() {
            "looping in player window"
        } else {
            "saved locally"
        };
        let body = vec![
            Line::from(Span::styled(
                format!("{:.1}s {}", preview.artifact.duration().as_secs_f64(), preview.artifact.mime()),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )),
            Line::from(Span::styled(
                format!("{name} ({looping})"),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
        ];
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_SUCCESS))
            .title(Span::styled(
                " Your reply ",
                Style::default()
                    .fg(COLOR_SUCCESS)
                    .add_modifier(Modifier::BOLD),
            ))
            .style(Style::default().bg(COLOR_PANEL_FOCUSED_BG));
        frame.render_widget(Paragraph::new(Text::from(body)).block(block), area);

        let close = Rect {
            x: (area.x + area.width).saturating_sub(4),
            y: area.y,
            width: 3,
            height: 1,
        };
        frame.render_widget(
            Paragraph::new("[×]").style(Style::default().fg(COLOR_ERROR)),
            close,
        );
        self.hits.preview_close = close;
    }

    fn draw_reply_modal(&mut self, frame: &mut Frame<'_>, phone: Rect) {
        let Some(flow) = self.reply.as_ref() else {
            return;
        };
        let popup_area = centered_rect(92, 80, phone);
        frame.render_widget(Clear, popup_area);
        self.hits.modal = popup_area;

        let block = Block::default()
            .title(Span::styled(
                "Reply with a 7s Short",
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_ACCENT))
            .style(Style::default().bg(COLOR_PANEL_BG));
        let inner = block.inner(popup_area);
        frame.render_widget(block, popup_area);

        let close = Rect {
            x: (popup_area.x + popup_area.width).saturating_sub(4),
            y: popup_area.y,
            width: 3,
            height: 1,
        };
        frame.render_widget(
            Paragraph::new("[×]").style(Style::default().fg(COLOR_TEXT_SECONDARY)),
            close,
        );
        self.hits.modal_close = close;

        let width = inner.width.saturating_sub(2);
        let text = Style::default().fg(COLOR_TEXT_PRIMARY);
        let muted = Style::default().fg(COLOR_TEXT_SECONDARY);
        let mut lines: Vec<Line<'static>> = Vec::new();
        // Rows (relative to `inner`) that act as buttons.
        let mut tier_rows: Vec<usize> = Vec::new();
        let mut action_row: Option<usize> = None;

        match flow.step() {
            ReplyStep::Upgrade => {
                lines.extend(wrap_lines(
                    "You've used all your reply credits this month. Upgrade to post more 7-second responses and support creators.",
                    width,
                    text,
                ));
                lines.push(Line::default());
                for (i, tier) in Tier::ALL.iter().enumerate() {
                    let policy = tier.policy();
                    let current = *tier == self.store.tier();
                    let style = if current {
                        Style::default()
                            .fg(COLOR_ACCENT)
                            .bg(COLOR_PANEL_SELECTED_BG)
                            .add_modifier(Modifier::BOLD)
                    } else {
                        text
                    };
                    tier_rows.push(lines.len());
                    lines.push(Line::from(Span::styled(
                        format!(
                            " [{}] {:<8} {}{}",
                            i + 1,
                            policy.label,
                            policy.allowance_label(),
                            if current { "  (current)" } else { "" }
                        ),
                        style,
                    )));
                }
                lines.push(Line::default());
                lines.extend(wrap_lines(
                    "Replies drive extra engagement; creators can earn a share of ad revenue on response Shorts.",
                    width,
                    muted.add_modifier(Modifier::ITALIC),
                ));
            }
            ReplyStep::Record | ReplyStep::Capturing => {
                let parent = self.catalog.get(flow.parent_id());
                let responses = self.catalog.responses_for(flow.parent_id());
                if !responses.is_empty() {
                    lines.push(Line::from(Span::styled(
                        format!("{} (7s)", pluralize(responses.len(), "response")),
                        muted.add_modifier(Modifier::BOLD),
                    )));
                    for response in responses.iter().take(MAX_LISTED_RESPONSES) {
                        lines.push(Line::from(vec![
                            Span::styled(
                                format!(" {} ", response.creator.handle),
                                text.add_modifier(Modifier::BOLD),
                            ),
                            Span::styled(response.title.clone(), muted),
                        ]));
                    }
                    lines.push(Line::default());
                }
                let title = parent.map(|short| short.title.as_str()).unwrap_or("this short");
                lines.extend(wrap_lines(
                    &format!("Respond to \"{title}\" with a 7-second video."),
                    width,
                    text,
                ));
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    format!("Your credits: {}", self.store.credits().label()),
                    Style::default().fg(COLOR_ACCENT),
                )));
                if let Some(error) = flow.error() {
                    lines.extend(wrap_lines(
                        &format!("{error}. Allow camera (and mic) to record."),
                        width,
                        Style::default().fg(COLOR_ERROR),
                    ));
                }
                lines.push(Line::default());
                action_row = Some(lines.len());
                if let Some(left) = flow.countdown(Instant::now()) {
                    let label = if flow.device_live() {
                        format!(" ● {left}s  Recording…")
                    } else {
                        format!(" ● {left}s  Waiting for camera…")
                    };
                    lines.push(Line::from(Span::styled(
                        label,
                        Style::default()
                            .fg(COLOR_ERROR)
                            .add_modifier(Modifier::BOLD),
                    )));
                } else {
                    lines.push(Line::from(Span::styled(
                        " [Enter] Start 7s recording ",
                        Style::default()
                            .fg(COLOR_BG)
                            .bg(COLOR_ACCENT)
                            .add_modifier(Modifier::BOLD),
                    )));
                }
            }
            ReplyStep::Success => {
                lines.push(Line::from(Span::styled(
                    "Reply posted",
                    Style::default()
                        .fg(COLOR_SUCCESS)
                        .add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::default());
                lines.extend(wrap_lines(
                    "Your 7-second response is saved. It is linked to the original Short and counts toward reply engagement.",
                    width,
                    text,
                ));
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    format!("Your credits: {}", self.store.credits().label()),
                    Style::default().fg(COLOR_ACCENT),
                )));
                lines.push(Line::default());
                action_row = Some(lines.len());
                lines.push(Line::from(Span::styled(
                    " [Enter] Done ",
                    Style::default()
                        .fg(COLOR_BG)
                        .bg(COLOR_ACCENT)
                        .add_modifier(Modifier::BOLD),
                )));
            }
        }

        let body_area = Rect {
            x: inner.x + 1,
            width,
            ..inner
        };
        let row_rect = |row: usize| {
            let y = body_area.y.saturating_add(row as u16);
            if y < body_area.y + body_area.height {
                Rect {
                    y,
                    height: 1,
                    ..body_area
                }
            } else {
                Rect::default()
            }
        };
        for (slot, row) in tier_rows.iter().enumerate().take(3) {
            self.hits.modal_tiers[slot] = row_rect(*row);
        }
        if let Some(row) = action_row {
            self.hits.modal_action = row_rect(row);
        }

        frame.render_widget(Paragraph::new(Text::from(lines)), body_area);
    }
}
