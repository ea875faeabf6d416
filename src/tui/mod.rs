//! Ratatui-based terminal UI.
//!
//! The TUI runs the same refinement as `spinfit fit`, then shows the observed
//! and calculated signals with the difference curve, plus the parameter table.
//! Refits reuse the already loaded inputs.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
};
use tracing::debug;

use crate::app::pipeline::{FitInputs, RunOutput, load_inputs, run_fit_with_inputs};
use crate::cli::FitArgs;
use crate::domain::FitConfig;
use crate::error::{AppError, EXIT_CALC};

mod plotters_chart;

use plotters_chart::SpinPlottersChart;

const X_LABEL: &str = "r (A)";
const Y_LABEL: &str = "d(r)";

/// Start the TUI.
pub fn run(args: FitArgs) -> Result<(), AppError> {
    // Input problems are reported before the terminal is taken over.
    let config = crate::app::fit_config_from_args(&args)?;
    let inputs = load_inputs(&config)?;

    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(EXIT_CALC, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(config, inputs);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(EXIT_CALC, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(
                EXIT_CALC,
                format!("Failed to enter alternate screen: {e}"),
            ));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    config: FitConfig,
    inputs: FitInputs,
    show_diff: bool,
    status: String,
    run: Option<RunOutput>,
}

impl App {
    fn new(config: FitConfig, inputs: FitInputs) -> Self {
        let mut app = Self {
            config,
            inputs,
            show_diff: true,
            status: String::new(),
            run: None,
        };
        app.refit();
        app
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(EXIT_CALC, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(EXIT_CALC, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(EXIT_CALC, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the UI should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('r') => {
                // A new seed only matters for a random start.
                self.config.initial = None;
                self.config.seed = self.config.seed.wrapping_add(1);
                self.refit();
            }
            KeyCode::Char('m') => {
                self.config.mode = self.config.mode.toggled();
                self.refit();
            }
            KeyCode::Char('d') => {
                self.show_diff = !self.show_diff;
            }
            _ => {}
        }
        false
    }

    /// Refit with the current settings. Failures are shown in the footer and
    /// leave the previous result on screen.
    fn refit(&mut self) {
        debug!(mode = self.config.mode.display_name(), seed = self.config.seed, "tui refit");
        match run_fit_with_inputs(&self.config, &self.inputs) {
            Ok(run) => {
                self.status = format!(
                    "{}: {} after {} iterations",
                    self.config.mode.display_name(),
                    run.outcome.status.label(),
                    run.outcome.iterations
                );
                self.run = Some(run);
            }
            Err(err) => {
                self.status = format!("Fit failed ({}): {err}", self.config.mode.display_name());
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("spinfit", Style::default().fg(Color::Cyan)),
            Span::raw(" - mPDF spin direction refinement"),
        ]));

        lines.push(Line::from(Span::styled(
            format!(
                "structure: {} | strategy: {} | class: {} | seed: {} | n={}",
                self.inputs.structure.name,
                self.config.mode.display_name(),
                self.config.symmetry_class,
                self.config.seed,
                self.inputs.observed.len(),
            ),
            Style::default().fg(Color::Gray),
        )));

        if let Some(run) = &self.run {
            let o = &run.outcome;
            lines.push(Line::from(Span::styled(
                format!(
                    "{} | Rw={:.4} | chi2={:.4e} | theta={:.4} phi={:.4} | dir=({:.3}, {:.3}, {:.3})",
                    o.status.label(),
                    o.quality.rw,
                    o.quality.chi2,
                    o.params.theta,
                    o.params.phi,
                    o.direction.x,
                    o.direction.y,
                    o.direction.z,
                ),
                Style::default().fg(Color::Gray),
            )));
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(9)])
            .split(area);

        self.draw_chart(frame, chunks[0]);
        self.draw_params(frame, chunks[1]);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("mPDF").borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(run) = &self.run else {
            let msg = Paragraph::new("No fit available.")
                .style(Style::default().fg(Color::Yellow))
                .block(Block::default());
            frame.render_widget(msg, inner);
            return;
        };

        let series = chart_series(run, self.show_diff);

        let (chart_rect, insets) = chart_layout(inner);
        let widget = SpinPlottersChart {
            calc: &series.calc,
            obs: &series.obs,
            diff: &series.diff,
            diff_offset: series.diff_offset,
            x_bounds: series.x_bounds,
            y_bounds: series.y_bounds,
            x_label: X_LABEL,
            y_label: Y_LABEL,
            fmt_x: fmt_axis_x,
            fmt_y: fmt_axis_y,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, series.x_bounds, series.y_bounds);
        }
    }

    fn draw_params(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let text = match &self.run {
            Some(run) => crate::report::format_param_table(&run.outcome, &self.config.bounds),
            None => "-".to_string(),
        };
        let p = Paragraph::new(text).block(Block::default().title("Parameters").borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "r refit (new seed)  m strategy  d difference  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Series and bounds for the chart widget.
#[derive(Debug, Clone)]
struct ChartSeries {
    obs: Vec<(f64, f64)>,
    calc: Vec<(f64, f64)>,
    diff: Vec<(f64, f64)>,
    diff_offset: Option<f64>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

/// Build chart series for Plotters.
///
/// The difference curve is shifted so its maximum sits below the lowest
/// signal value with a small gap.
fn chart_series(run: &RunOutput, show_diff: bool) -> ChartSeries {
    let r = &run.observed.r;
    let obs_y = &run.observed.y;
    let calc_y = &run.outcome.signal.dr;

    let mut x0 = r.first().copied().unwrap_or(0.0);
    let mut x1 = r.last().copied().unwrap_or(1.0);
    if !x0.is_finite() || !x1.is_finite() || x1 <= x0 {
        x0 = 0.0;
        x1 = 1.0;
    }

    let obs: Vec<(f64, f64)> = r.iter().copied().zip(obs_y.iter().copied()).collect();
    let calc: Vec<(f64, f64)> = r.iter().copied().zip(calc_y.iter().copied()).collect();

    let (mut y_min, mut y_max) = finite_range(obs_y.iter().chain(calc_y.iter()).copied());
    if !y_min.is_finite() || !y_max.is_finite() || y_max <= y_min {
        y_min = 0.0;
        y_max = 1.0;
    }

    let mut diff = Vec::new();
    let mut diff_offset = None;
    if show_diff {
        let raw: Vec<f64> = obs_y.iter().zip(calc_y).map(|(o, c)| o - c).collect();
        let (d_min, d_max) = finite_range(raw.iter().copied());
        if d_min.is_finite() && d_max.is_finite() {
            let gap = 0.1 * (y_max - y_min);
            let offset = y_min - gap - d_max;
            diff = r.iter().zip(&raw).map(|(&x, &d)| (x, d + offset)).collect();
            diff_offset = Some(offset);
            y_min = offset + d_min;
        }
    }

    let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);
    ChartSeries {
        obs,
        calc,
        diff,
        diff_offset,
        x_bounds: [x0, x1],
        y_bounds: [y_min - pad, y_max + pad],
    }
}

fn finite_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

fn fmt_axis_x(v: f64) -> String {
    format!("{v:.1}")
}

fn fmt_axis_y(v: f64) -> String {
    format!("{v:.2}")
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis_x(x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub((label.len() / 2) as u16);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_axis_y(y_val);
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new(X_LABEL)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new(Y_LABEL).style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::MpdfSignal;
    use crate::domain::{FitParams, FitQuality, ObservedData};
    use crate::fit::FitOutcome;
    use crate::math::LmStatus;
    use nalgebra::Vector3;

    fn run_output() -> RunOutput {
        let p = FitParams {
            ord_scale: 1.0,
            para_scale: 0.0,
            damp_rate: 0.0,
            theta: 0.0,
            phi: 0.0,
        };
        let r = vec![1.0, 2.0, 3.0];
        RunOutput {
            structure_name: "toy".to_string(),
            observed: ObservedData {
                r: r.clone(),
                y: vec![1.0, -1.0, 0.5],
                column: "dr".to_string(),
            },
            outcome: FitOutcome {
                params: p,
                initial: p,
                direction: Vector3::new(0.0, 0.0, 1.0),
                signal: MpdfSignal {
                    fr: vec![0.8, -0.8, 0.5],
                    dr: vec![0.8, -0.8, 0.5],
                    r,
                },
                quality: FitQuality {
                    chi2: 0.08,
                    reduced_chi2: 0.0,
                    rw: 0.2,
                    n: 3,
                    k: 5,
                },
                status: LmStatus::CostConverged,
                iterations: 3,
                evaluations: 18,
            },
        }
    }

    #[test]
    fn difference_curve_sits_below_the_signals() {
        let s = chart_series(&run_output(), true);
        assert_eq!(s.x_bounds, [1.0, 3.0]);
        let offset = s.diff_offset.unwrap();
        // Signal range [-1, 1], gap 0.2, max diff 0.2.
        assert!((offset - (-1.4)).abs() < 1e-12);
        let max_diff = s.diff.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        assert!(max_diff < -1.0);
        assert!(s.y_bounds[0] < s.diff.iter().map(|p| p.1).fold(f64::INFINITY, f64::min));
    }

    #[test]
    fn hidden_difference_keeps_signal_bounds() {
        let s = chart_series(&run_output(), false);
        assert!(s.diff.is_empty());
        assert!(s.diff_offset.is_none());
        assert!((s.y_bounds[0] - (-1.1)).abs() < 1e-12);
        assert!((s.y_bounds[1] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn small_areas_skip_axis_insets() {
        let (rect, insets) = chart_layout(Rect::new(0, 0, 15, 6));
        assert!(insets.is_none());
        assert_eq!(rect, Rect::new(0, 0, 15, 6));

        let (rect, insets) = chart_layout(Rect::new(0, 0, 80, 20));
        assert!(insets.is_some());
        assert_eq!(rect, Rect::new(8, 1, 70, 17));
    }
}
