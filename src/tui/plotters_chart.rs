//! Plotters-powered mPDF chart widget for Ratatui.
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// A render-only chart description.
///
/// All series and bounds are computed outside the render call, so `render()`
/// only draws.
pub struct SpinPlottersChart<'a> {
    /// Line series for the calculated signal.
    pub calc: &'a [(f64, f64)],
    /// Scatter series for the observed signal.
    pub obs: &'a [(f64, f64)],
    /// Line series for `obs - calc`, already shifted below the signals.
    pub diff: &'a [(f64, f64)],
    /// Baseline of the shifted difference curve.
    pub diff_offset: Option<f64>,
    /// X bounds (Å).
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl<'a> Widget for SpinPlottersChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Plotters may fail to build a chart in a tiny area; show a hint instead.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let x0 = self.x_bounds[0];
        let x1 = self.x_bounds[1];
        let y0 = self.y_bounds[0];
        let y1 = self.y_bounds[1];

        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(self.x_label)
                .y_desc(self.y_label)
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let calc_color = RGBColor(0, 255, 255); // cyan
            let obs_color = WHITE;
            let diff_color = RGBColor(255, 0, 0); // red
            let baseline_color = RGBColor(128, 128, 128);

            if let Some(offset) = self.diff_offset {
                chart.draw_series(LineSeries::new([(x0, offset), (x1, offset)], &baseline_color))?;
                chart.draw_series(LineSeries::new(self.diff.iter().copied(), &diff_color))?;
            }

            chart.draw_series(LineSeries::new(self.calc.iter().copied(), &calc_color))?;

            // `Circle` radii are mis-scaled by the backend; single pixels read cleanly.
            chart.draw_series(self.obs.iter().map(|&(x, y)| Pixel::new((x, y), obs_color)))?;

            Ok(())
        });

        widget.render(area, buf);
    }
}
