// Terminal view for a capture session (ratatui + crossterm)

use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use neural_capture::analysis::ContactLevel;
use neural_capture::capture::CaptureState;
use neural_capture::device::{DeviceMode, Electrode};
use neural_capture::engine::{intent_for_key, Display, KeyPress, UserIntent, ViewFrame};
use neural_capture::error::CaptureError;
use neural_capture::telemetry::ReadingKind;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, Gauge, GraphType, Paragraph},
    Frame, Terminal,
};

const ELECTRODE_COLORS: [Color; 4] = [Color::Cyan, Color::Yellow, Color::Green, Color::Magenta];

pub struct TerminalDisplay {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    restored: bool,
}

impl TerminalDisplay {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self {
            terminal,
            restored: false,
        })
    }

    pub fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()
    }
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

impl Display for TerminalDisplay {
    fn render(&mut self, frame: &ViewFrame<'_>) -> Result<UserIntent, CaptureError> {
        self.terminal
            .draw(|f| draw(f, frame))
            .map_err(display_failed)?;

        // Drain every pending key; the last meaningful one wins
        let mut intent = UserIntent::None;
        while event::poll(Duration::ZERO).map_err(display_failed)? {
            if let Event::Key(key) = event::read().map_err(display_failed)? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match intent_for_key(key_press(key)) {
                    UserIntent::None => {}
                    other => intent = other,
                }
            }
        }
        Ok(intent)
    }
}

fn display_failed(err: io::Error) -> CaptureError {
    CaptureError::DisplayFailed {
        reason: err.to_string(),
    }
}

fn key_press(key: KeyEvent) -> KeyPress {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyPress::CtrlC,
        KeyCode::Enter => KeyPress::Enter,
        KeyCode::Esc => KeyPress::Esc,
        KeyCode::Char(c) => KeyPress::Char(c),
        _ => KeyPress::Other,
    }
}

// ── Layout ────────────────────────────────────────────────────────────────────

fn draw(frame: &mut Frame, view: &ViewFrame<'_>) {
    let [header, body, gauge, status, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_header(frame, header, view);

    let [contacts, chart] =
        Layout::horizontal([Constraint::Length(46), Constraint::Min(20)]).areas(body);
    draw_contacts(frame, contacts, view);
    draw_trend(frame, chart, view);

    draw_gauge(frame, gauge, view);
    draw_status(frame, status, view);
    draw_footer(frame, footer, view);
}

fn state_color(state: CaptureState) -> Color {
    match state {
        CaptureState::Setup => Color::Cyan,
        CaptureState::Countdown => Color::Yellow,
        CaptureState::Capture => Color::Green,
        CaptureState::Complete => Color::LightGreen,
        CaptureState::Error => Color::Red,
        CaptureState::Cancelled => Color::DarkGray,
    }
}

fn level_color(level: ContactLevel) -> Color {
    match level {
        ContactLevel::Excellent => Color::Green,
        ContactLevel::Acceptable => Color::Yellow,
        ContactLevel::Poor => Color::LightRed,
        ContactLevel::CriticalHigh | ContactLevel::CriticalLow => Color::Red,
    }
}

fn draw_header(frame: &mut Frame, area: Rect, view: &ViewFrame<'_>) {
    let state = view.snapshot.state;
    let mode = match view.snapshot.device_mode {
        DeviceMode::None => "idle",
        DeviceMode::Impedance => "impedance",
        DeviceMode::Signal => "signal",
    };
    let line = Line::from(vec![
        Span::styled(
            " NEURAL CAPTURE ",
            Style::default().fg(Color::Black).bg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  label: "),
        Span::styled(view.label.as_str(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  state: "),
        Span::styled(
            state.label().to_uppercase(),
            Style::default().fg(state_color(state)).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  device: "),
        Span::styled(mode, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

/// One row per electrode: latest reading plus contact verdict
fn draw_contacts(frame: &mut Frame, area: Rect, view: &ViewFrame<'_>) {
    let in_setup = view.snapshot.state == CaptureState::Setup;
    let mut lines = Vec::with_capacity(Electrode::ALL.len() + 2);

    for (electrode, kohm, level) in view.contact_levels() {
        let impedance = match kohm {
            Some(value) => format!("{:>7.0} kΩ", value),
            None => "      - kΩ".to_string(),
        };
        let signal = view
            .snapshot
            .eeg
            .get(electrode)
            .map(|uv| format!("{:>7.1} µV", uv))
            .unwrap_or_else(|| "      - µV".to_string());
        let color = level_color(level);

        let mut spans = vec![
            Span::styled(
                format!(" {:<3}", electrode.name()),
                Style::default().fg(ELECTRODE_COLORS[electrode.index()]).add_modifier(Modifier::BOLD),
            ),
            Span::raw(impedance),
            Span::raw("  "),
            Span::raw(signal),
            Span::raw("  "),
            Span::styled(level.symbol(), Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ];
        if in_setup {
            spans.push(Span::styled(format!(" {}", level.hint()), Style::default().fg(color)));
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::raw(""));
    lines.push(if view.contact_ok {
        Line::styled(
            " Contact OK. Press Enter to start.",
            Style::default().fg(Color::Green),
        )
    } else {
        Line::styled(
            " Waiting for acceptable contact on every electrode.",
            Style::default().fg(Color::Yellow),
        )
    });

    frame.render_widget(
        Paragraph::new(lines).block(Block::default().title(" Electrodes ").borders(Borders::ALL)),
        area,
    );
}

/// Impedance trend during setup, signal magnitude afterwards
fn draw_trend(frame: &mut Frame, area: Rect, view: &ViewFrame<'_>) {
    let (kind, title, unit) = if view.snapshot.state == CaptureState::Setup {
        (ReadingKind::Impedance, " Impedance trend ", "kΩ")
    } else {
        (ReadingKind::Signal, " Signal magnitude ", "µV")
    };

    let series: Vec<Vec<(f64, f64)>> = Electrode::ALL
        .iter()
        .map(|&electrode| {
            view.history
                .series(kind, electrode)
                .into_iter()
                .enumerate()
                .map(|(i, value)| (i as f64, value))
                .collect()
        })
        .collect();

    let peak = series
        .iter()
        .flatten()
        .map(|&(_, value)| value)
        .fold(0.0_f64, f64::max);
    let y_max = match kind {
        ReadingKind::Impedance => peak.max(view.thresholds.poor * 1.25),
        ReadingKind::Signal => (peak * 1.2).max(1.0),
    };
    let x_max = view.history.max_len().max(2) as f64 - 1.0;

    let datasets: Vec<Dataset> = Electrode::ALL
        .iter()
        .zip(series.iter())
        .map(|(&electrode, data)| {
            Dataset::default()
                .name(electrode.name())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(ELECTRODE_COLORS[electrode.index()]))
                .data(data)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(Block::default().title(title).borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .bounds([0.0, x_max])
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, y_max])
                .labels(vec![
                    format!("0 {unit}"),
                    format!("{:.0}", y_max / 2.0),
                    format!("{:.0}", y_max),
                ])
                .style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(chart, area);
}

fn draw_gauge(frame: &mut Frame, area: Rect, view: &ViewFrame<'_>) {
    let snapshot = view.snapshot;
    let (title, ratio, label, color) = match (snapshot.state, snapshot.countdown_remaining) {
        (CaptureState::Countdown, remaining) => {
            let remaining = remaining.unwrap_or(0);
            (" Countdown ", 0.0, format!("{} s", remaining), Color::Yellow)
        }
        _ => {
            let progress = snapshot.progress;
            (
                " Progress ",
                progress.fraction(),
                format!("{}/{} windows", progress.saved, progress.target),
                Color::Green,
            )
        }
    };

    let gauge = Gauge::default()
        .block(Block::default().title(title).borders(Borders::ALL))
        .gauge_style(Style::default().fg(color))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(label);
    frame.render_widget(gauge, area);
}

fn draw_status(frame: &mut Frame, area: Rect, view: &ViewFrame<'_>) {
    let color = state_color(view.snapshot.state);
    frame.render_widget(
        Paragraph::new(Span::styled(
            view.snapshot.message.as_str(),
            Style::default().fg(color),
        ))
        .block(Block::default().title(" Status ").borders(Borders::ALL)),
        area,
    );
}

fn draw_footer(frame: &mut Frame, area: Rect, view: &ViewFrame<'_>) {
    let key = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);
    let mut spans = Vec::new();
    if view.snapshot.state == CaptureState::Setup {
        spans.push(Span::styled(" Enter", key));
        spans.push(Span::styled(" start  ", dim));
    }
    spans.push(Span::styled(" q/Esc", key));
    spans.push(Span::styled(" cancel", dim));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
