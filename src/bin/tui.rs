//! Parking TUI - operator console for the plate scanner
//!
//! Runs the scan pipeline in-process and displays:
//! - Scanner status and the last detected plate
//! - Hourly rate with an edit/commit toggle
//! - Active sessions (plate, entry time)
//! - Recent payments (plate, duration, amount)

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_console::infra::{Config, Metrics};
use parking_console::io::{FileFrameSource, FrameSource, HttpOcrEngine};
use parking_console::services::{ParkingState, ScanPipeline, ScanReport, ScanStatus, Transition};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Parking TUI - plate scanner operator console
#[derive(Parser, Debug)]
#[command(name = "parking-tui", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

/// UI-only state; parking state lives in the pipeline
#[derive(Debug, Default)]
struct ConsoleState {
    /// Text typed into the rate field while editing
    rate_input: String,
    /// Whether `rate_input` was rejected
    rate_input_invalid: bool,
    /// Result of the last completed scan
    last_report: Option<ScanReport>,
    /// One-line operator notice (e.g. no frame available)
    notice: Option<(String, Instant)>,
}

type SharedReport = Arc<parking_lot::Mutex<Option<ScanReport>>>;

struct App {
    pipeline: Arc<ScanPipeline>,
    frames: FileFrameSource,
    currency: String,
    console: ConsoleState,
    completed: SharedReport,
}

impl App {
    fn scan(&mut self) {
        if self.pipeline.is_scanning() {
            return;
        }
        let Some(image) = self.frames.capture() else {
            let notice = format!("No frame available at {}", self.frames.path().display());
            self.notify(&notice);
            return;
        };

        let pipeline = self.pipeline.clone();
        let completed = self.completed.clone();
        tokio::spawn(async move {
            if let Ok(report) = pipeline.scan(image).await {
                *completed.lock() = Some(report);
            }
        });
    }

    fn begin_rate_edit(&mut self) {
        let mut state = self.pipeline.state().lock();
        if state.rate().is_editing() {
            return;
        }
        state.rate_mut().begin_edit();
        self.console.rate_input = state.rate().hourly_rate().to_string();
        self.console.rate_input_invalid = false;
    }

    fn edit_rate(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' || c == '-' => {
                self.console.rate_input.push(c);
            }
            KeyCode::Backspace => {
                self.console.rate_input.pop();
            }
            _ => return,
        }
        let result = self.pipeline.state().lock().rate_mut().apply_input(&self.console.rate_input);
        self.console.rate_input_invalid = result.is_err();
    }

    fn commit_rate(&mut self) {
        let rate = self.pipeline.state().lock().rate_mut().commit();
        self.console.rate_input.clear();
        self.console.rate_input_invalid = false;
        self.notify(&format!("Rate saved: {}{}/hr", self.currency, rate));
    }

    fn notify(&mut self, text: &str) {
        self.console.notice = Some((text.to_string(), Instant::now()));
    }

    /// Move a finished background scan into the console state
    fn collect_completed(&mut self) {
        if let Some(report) = self.completed.lock().take() {
            self.console.last_report = Some(report);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    // stdout belongs to the terminal UI, so logs go to a file
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(config.log_file())?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .init();

    let mut state = ParkingState::new(config.hourly_rate());
    if config.seed_demo_data() {
        state.seed_demo_data(chrono::Utc::now());
    }
    let recognizer = Arc::new(HttpOcrEngine::new(config.ocr_url())?);
    let frames = FileFrameSource::new(config.frame_path());
    info!(
        config_file = %config.config_file(),
        ocr_url = %recognizer.url(),
        frame_path = %frames.path().display(),
        "parking_tui_started"
    );
    let pipeline = Arc::new(ScanPipeline::new(
        recognizer,
        Arc::new(parking_lot::Mutex::new(state)),
        Arc::new(Metrics::new()),
        config.ocr_language(),
    ));

    let mut app = App {
        pipeline,
        frames,
        currency: config.currency().to_string(),
        console: ConsoleState::default(),
        completed: Arc::new(parking_lot::Mutex::new(None)),
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    info!("parking_tui_stopped");
    result
}

fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> anyhow::Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        app.collect_completed();
        terminal.draw(|f| draw_ui(f, app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let editing = app.pipeline.state().lock().rate().is_editing();
                    if editing {
                        match key.code {
                            KeyCode::Enter | KeyCode::Esc => app.commit_rate(),
                            code => app.edit_rate(code),
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                            KeyCode::Char('s') | KeyCode::Char(' ') => app.scan(),
                            KeyCode::Char('e') => app.begin_rate_edit(),
                            _ => {}
                        }
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn draw_ui(f: &mut Frame, app: &App) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Body
            Constraint::Length(1), // Key help
        ])
        .split(f.area());

    draw_header(f, main_chunks[0], app);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_chunks[1]);

    draw_scanner_panel(f, body_chunks[0], app);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(body_chunks[1]);

    draw_sessions_panel(f, right_chunks[0], app);
    draw_history_panel(f, right_chunks[1], app);
    draw_help(f, main_chunks[2], app);
}

fn status_badge(status: ScanStatus) -> (&'static str, Color) {
    match status {
        ScanStatus::Ready => ("READY TO SCAN", Color::Gray),
        ScanStatus::Scanning => ("PROCESSING...", Color::Blue),
        ScanStatus::Success => ("PLATE DETECTED", Color::Green),
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let (badge, badge_color) = status_badge(app.pipeline.status());
    let state = app.pipeline.state().lock();

    let rate_span = if state.rate().is_editing() {
        let color = if app.console.rate_input_invalid { Color::Red } else { Color::White };
        Span::styled(
            format!("{}{}_ [Enter to save]", app.currency, app.console.rate_input),
            Style::default().fg(color).add_modifier(Modifier::UNDERLINED),
        )
    } else {
        Span::styled(
            format!("{}{}", app.currency, state.rate().hourly_rate()),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Plate Scanner ",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("| "),
        Span::styled(badge, Style::default().fg(badge_color)),
        Span::raw(" | Rate/Hr: "),
        rate_span,
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn draw_scanner_panel(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Detected plate
            Constraint::Min(0),    // Last result
        ])
        .split(area);

    let plate_text = if app.pipeline.is_scanning() {
        "Scanning...".to_string()
    } else {
        app.pipeline.last_plate().map(|p| p.to_string()).unwrap_or_else(|| "----".to_string())
    };

    let detected = Paragraph::new(vec![
        Line::from(Span::styled("DETECTED PLATE", Style::default().fg(Color::DarkGray))),
        Line::from(Span::styled(
            plate_text,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
    ])
    .block(
        Block::default()
            .title(" Camera ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(detected, chunks[0]);

    let mut lines = Vec::new();
    if let Some(report) = &app.console.last_report {
        match &report.transition {
            Transition::Entry { session } => {
                lines.push(Line::from(vec![
                    Span::styled("ENTRY ", Style::default().fg(Color::Green)),
                    Span::raw(format!("{} at {}", session.plate, session.entry_label())),
                ]));
            }
            Transition::Exit { record } => {
                lines.push(Line::from(vec![
                    Span::styled("EXIT  ", Style::default().fg(Color::Cyan)),
                    Span::raw(format!(
                        "{} {} {}",
                        record.plate(),
                        record.duration_label(),
                        record.cost_label(&app.currency)
                    )),
                ]));
            }
        }
        if let Some(confidence) = report.confidence {
            lines.push(Line::from(format!("Confidence: {confidence:.0}")));
        }
    }
    if let Some((notice, at)) = &app.console.notice {
        if at.elapsed() < Duration::from_secs(5) {
            lines.push(Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Magenta))));
        }
    }

    let result = Paragraph::new(lines).block(
        Block::default()
            .title(" Last Scan ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(result, chunks[1]);
}

fn draw_sessions_panel(f: &mut Frame, area: Rect, app: &App) {
    let state = app.pipeline.state().lock();
    let sessions = state.registry().sessions();

    let items: Vec<ListItem> = if sessions.is_empty() {
        vec![ListItem::new(Span::styled("No cars parked", Style::default().fg(Color::DarkGray)))]
    } else {
        sessions
            .iter()
            .map(|s| {
                ListItem::new(Line::from(vec![
                    Span::styled("● ", Style::default().fg(Color::Green)),
                    Span::styled(
                        format!("{:<12}", s.plate),
                        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(format!(" In: {}", s.entry_label()), Style::default().fg(Color::Green)),
                ]))
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .title(format!(" Active Sessions ({}) ", sessions.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    f.render_widget(list, area);
}

fn draw_history_panel(f: &mut Frame, area: Rect, app: &App) {
    let state = app.pipeline.state().lock();
    let ledger = state.ledger();

    let rows: Vec<Row> = if ledger.is_empty() {
        vec![Row::new(vec!["No history yet".to_string()])]
    } else {
        ledger
            .all()
            .map(|r| {
                Row::new(vec![
                    r.plate().to_string(),
                    r.exit_label(),
                    r.duration_label(),
                    r.cost_label(&app.currency),
                ])
            })
            .collect()
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(12), // Plate
            Constraint::Length(6),  // Exit
            Constraint::Length(6),  // Time
            Constraint::Min(8),     // Amount
        ],
    )
    .header(
        Row::new(vec!["Plate", "Out", "Time", "Amount"])
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .title(format!(" Recent Payments ({}) ", ledger.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );

    f.render_widget(table, area);
}

fn draw_help(f: &mut Frame, area: Rect, app: &App) {
    let editing = app.pipeline.state().lock().rate().is_editing();
    let help = if editing {
        "type rate · Backspace delete · Enter/Esc save"
    } else if app.pipeline.is_scanning() {
        "processing scan... · q quit"
    } else {
        "s/Space scan plate · e edit rate · q quit"
    };
    f.render_widget(Paragraph::new(Span::styled(help, Style::default().fg(Color::DarkGray))), area);
}
