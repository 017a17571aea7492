use std::{
    io,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::engine::{LinkEventKind, LinkEventSummary, Simulator};
use arq_lab_abstract::StationId;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::widgets::canvas::{Canvas, Line as CanvasLine, Points};
use ratatui::{
    prelude::*,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph},
};

const LOG_CAPACITY: usize = 1000;

/// A `tracing` writer that keeps recent lines in memory while the TUI owns
/// the terminal.
#[derive(Clone, Default)]
pub struct MemoryLogBuffer {
    logs: Arc<Mutex<Vec<String>>>,
}

impl MemoryLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: String) {
        // a poisoned lock only means a writer panicked mid-push
        let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        logs.push(msg);
        if logs.len() > LOG_CAPACITY {
            logs.remove(0);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl io::Write for MemoryLogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.push(s.trim().to_string());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct TuiApp {
    simulator: Simulator,
    paused: bool,
    scenario_name: Option<String>,
    /// Lines scrolled back from the newest link event.
    link_scroll: usize,
}

impl TuiApp {
    pub fn new(simulator: Simulator, scenario_name: Option<String>) -> Self {
        Self {
            simulator,
            paused: true,
            scenario_name,
            link_scroll: 0,
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let tick_rate = Duration::from_millis(100);
        let mut last_tick = Instant::now();

        self.simulator.init();

        loop {
            terminal.draw(|f| self.ui(f))?;

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or(Duration::ZERO);

            if event::poll(timeout)?
                && let Event::Key(key) = event::read()?
            {
                match key.code {
                    KeyCode::Char('q') => break,
                    KeyCode::Char(' ') => self.paused = !self.paused,
                    KeyCode::Char('s') => {
                        self.simulator.step();
                    }
                    KeyCode::Up => self.link_scroll = self.link_scroll.saturating_add(1),
                    KeyCode::Down => self.link_scroll = self.link_scroll.saturating_sub(1),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                if !self.paused && !self.simulator.step() {
                    self.paused = true;
                }
                last_tick = Instant::now();
            }
        }

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    pub fn into_simulator(self) -> Simulator {
        self.simulator
    }

    fn ui(&self, f: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),  // control bar
                Constraint::Length(10), // space-time diagram
                Constraint::Min(0),     // dashboard | window chart
                Constraint::Length(10), // link events
            ])
            .split(f.area());

        self.render_control(f, rows[0]);
        self.render_link_space_time(f, rows[1]);

        let mid = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[2]);
        self.render_dashboard(f, mid[0]);
        self.render_window_history(f, mid[1]);

        self.render_link_events(f, rows[3]);
    }

    fn render_control(&self, f: &mut Frame, area: Rect) {
        let scenario = self.scenario_name.as_deref().unwrap_or("Ad-hoc Simulation");
        let status_text = format!(
            "Scenario: {} | Time: {} ms | Status: {} | Events Pending: {} | (q)uit (space)pause/resume (s)tep",
            scenario,
            self.simulator.current_time(),
            if self.paused { "PAUSED" } else { "RUNNING" },
            self.simulator.remaining_events()
        );
        let status = Paragraph::new(status_text)
            .block(Block::default().borders(Borders::ALL).title("Control"));
        f.render_widget(status, area);
    }

    fn render_dashboard(&self, f: &mut Frame, area: Rect) {
        let cfg = self.simulator.config();
        let link = self.simulator.link_config();
        let mut text = vec![Line::from(format!(
            "Link: MAX_SEQ={} PKT_LEN={} timeouts data={} ms ack={} ms",
            (1u16 << link.seq_bits) - 1,
            link.packet_len,
            link.data_timeout_ms,
            link.ack_timeout_ms
        ))];
        text.push(Line::from(format!(
            "Channel: loss={:.2} corrupt={:.2} latency={}..{} ms  {} bit/s",
            cfg.loss_rate, cfg.corrupt_rate, cfg.min_latency, cfg.max_latency, cfg.bit_rate
        )));

        for station in [StationId::A, StationId::B] {
            let stats = self.simulator.stats(station);
            text.push(Line::from(""));
            text.push(Line::from(Span::styled(
                format!("Station {station}"),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            text.push(Line::from(format!(
                "  sent DATA={} ACK={} NAK={}  backlog={}",
                stats.data_frames,
                stats.ack_frames,
                stats.nak_frames,
                self.simulator.backlog(station)
            )));
            text.push(Line::from(format!(
                "  delivered={} misordered={}  dropped={} corrupted={}",
                stats.delivered.len(),
                stats.misordered,
                stats.frames_dropped,
                stats.frames_corrupted
            )));
        }

        let block =
            Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Dashboard"));
        f.render_widget(block, area);
    }

    fn render_window_history(&self, f: &mut Frame, area: Rect) {
        let series: Vec<(StationId, Vec<(f64, f64)>)> = [StationId::A, StationId::B]
            .into_iter()
            .filter_map(|station| {
                let samples = self
                    .simulator
                    .metric_series(&format!("{station}.nbuffered"))?;
                let pts: Vec<(f64, f64)> =
                    samples.iter().map(|(t, v)| (*t as f64, *v)).collect();
                (!pts.is_empty()).then_some((station, pts))
            })
            .collect();

        if series.is_empty() {
            let block = Paragraph::new("No window metrics yet")
                .block(Block::default().borders(Borders::ALL).title("Sender Window"));
            f.render_widget(block, area);
            return;
        }

        let window = (1u64 << self.simulator.link_config().seq_bits) / 2;
        let y_max = window.max(1) as f64;
        let t_max = series
            .iter()
            .flat_map(|(_, pts)| pts.last())
            .map(|(t, _)| *t)
            .fold(1.0, f64::max);

        let datasets: Vec<Dataset> = series
            .iter()
            .map(|(station, pts)| {
                let color = match station {
                    StationId::A => Color::Cyan,
                    StationId::B => Color::Yellow,
                };
                Dataset::default()
                    .name(format!("{station} nbuffered"))
                    .marker(symbols::Marker::Braille)
                    .style(Style::default().fg(color))
                    .graph_type(GraphType::Line)
                    .data(pts)
            })
            .collect();

        let chart = Chart::new(datasets)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Sender Window Occupancy"),
            )
            .x_axis(
                Axis::default()
                    .title("ms")
                    .bounds([0.0, t_max])
                    .labels(vec![Span::raw("0"), Span::raw(format!("{t_max:.0}"))]),
            )
            .y_axis(
                Axis::default()
                    .title("frames")
                    .bounds([0.0, y_max])
                    .labels(vec![Span::raw("0"), Span::raw(format!("{y_max:.0}"))]),
            );

        f.render_widget(chart, area);
    }

    fn render_link_space_time(&self, f: &mut Frame, area: Rect) {
        let events = &self.simulator.link_events;
        if events.is_empty() {
            let block = Paragraph::new("No link activity yet")
                .block(Block::default().borders(Borders::ALL).title("Link"));
            f.render_widget(block, area);
            return;
        }

        // most recent events only, enough to fill the width
        let max_events = (area.width as usize).saturating_sub(4).max(4);
        let recent = &events[events.len().saturating_sub(max_events)..];

        let t_min = recent.first().map(|e| e.time as f64).unwrap_or(0.0);
        let mut t_max = recent
            .iter()
            .map(|e| (e.time + e.latency_ms.unwrap_or(0)) as f64)
            .fold(t_min, f64::max);
        if (t_max - t_min).abs() < f64::EPSILON {
            t_max += 1.0;
        }

        let mut lines: Vec<CanvasLine> = Vec::new();
        let mut drop_points: Vec<(f64, f64)> = Vec::new();
        let mut corrupt_points: Vec<(f64, f64)> = Vec::new();
        let mut annotations: Vec<(f64, f64, String, Color)> = Vec::new();

        for e in recent {
            let t0 = e.time as f64;
            match e.kind {
                LinkEventKind::Send => {
                    let (y_src, y_dst) = station_rows(e.station);
                    let t1 = t0 + e.latency_ms.unwrap_or(1) as f64;
                    let mid_t = (t0 + t1) / 2.0;
                    let color = if e.description.contains("DATA") {
                        Color::White
                    } else {
                        Color::Green
                    };
                    lines.push(CanvasLine {
                        x1: t0,
                        y1: y_src,
                        x2: mid_t,
                        y2: 1.0,
                        color,
                    });
                    lines.push(CanvasLine {
                        x1: mid_t,
                        y1: 1.0,
                        x2: t1,
                        y2: y_dst,
                        color,
                    });
                }
                LinkEventKind::Drop => {
                    drop_points.push((t0, 1.0));
                    annotations.push((t0, 1.25, annotation("DROP", e), Color::Red));
                }
                LinkEventKind::Corrupt => {
                    corrupt_points.push((t0, 1.0));
                    annotations.push((t0, 0.75, annotation("CORRUPT", e), Color::Yellow));
                }
                LinkEventKind::Deliver => {}
            }
        }

        let canvas = Canvas::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Link Space-Time Diagram"),
            )
            .x_bounds([t_min, t_max])
            .y_bounds([-0.5, 2.5])
            .paint(move |ctx| {
                for (y, color) in [(0.0, Color::Cyan), (1.0, Color::Gray), (2.0, Color::Yellow)] {
                    ctx.draw(&CanvasLine {
                        x1: t_min,
                        y1: y,
                        x2: t_max,
                        y2: y,
                        color,
                    });
                }
                ctx.print(t_min, 0.0, "A");
                ctx.print(t_min, 1.0, "ch");
                ctx.print(t_min, 2.0, "B");

                for line in &lines {
                    ctx.draw(line);
                }
                if !drop_points.is_empty() {
                    ctx.draw(&Points {
                        coords: &drop_points,
                        color: Color::Red,
                    });
                }
                if !corrupt_points.is_empty() {
                    ctx.draw(&Points {
                        coords: &corrupt_points,
                        color: Color::Yellow,
                    });
                }
                for (x, y, label, color) in &annotations {
                    ctx.print(
                        *x,
                        *y,
                        Span::styled(label.clone(), Style::default().fg(*color)),
                    );
                }
            });

        f.render_widget(canvas, area);
    }

    fn render_link_events(&self, f: &mut Frame, area: Rect) {
        let events = &self.simulator.link_events;
        if events.is_empty() {
            let block = Paragraph::new("No link events yet")
                .block(Block::default().borders(Borders::ALL).title("Link Events"));
            f.render_widget(block, area);
            return;
        }

        let visible = (area.height as usize).saturating_sub(2); // borders
        let total = events.len();
        let scroll = self.link_scroll.min(total.saturating_sub(visible));
        let end = total - scroll;
        let start = end.saturating_sub(visible);

        let items: Vec<ListItem> = events[start..end]
            .iter()
            .map(|e| {
                let text = format!("[{:>6} ms] {}", e.time, e.description);
                let style = match e.kind {
                    LinkEventKind::Drop | LinkEventKind::Corrupt => Style::default().fg(Color::Red),
                    LinkEventKind::Deliver => Style::default().fg(Color::Green),
                    LinkEventKind::Send => Style::default().fg(Color::White),
                };
                ListItem::new(Line::from(Span::styled(text, style)))
            })
            .collect();

        let list =
            List::new(items).block(Block::default().borders(Borders::ALL).title("Link Events"));
        f.render_widget(list, area);
    }
}

/// Canvas rows (source, destination) for a frame sent by `station`.
fn station_rows(station: StationId) -> (f64, f64) {
    match station {
        StationId::A => (0.0, 2.0),
        StationId::B => (2.0, 0.0),
    }
}

/// Short canvas label like `DROP seq=2`, falling back to the bare tag.
fn annotation(tag: &str, event: &LinkEventSummary) -> String {
    const LIMIT: usize = 16;
    let field = ["seq=", "ack="].into_iter().find_map(|key| {
        let idx = event.description.find(key)?;
        let value: String = event.description[idx + key.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        (!value.is_empty()).then(|| format!("{key}{value}"))
    });
    match field {
        Some(field) => {
            let mut label = format!("{tag} {field}");
            label.truncate(LIMIT);
            label
        }
        None => tag.to_string(),
    }
}
