//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed signal: `o`
//! - calculated signal: `-` line

use crate::domain::FitFile;

/// Render observed points and the calculated curve on a shared r axis.
pub fn render_ascii_plot(r: &[f64], obs: &[f64], calc: &[f64], width: usize, height: usize) -> String {
    let (r_min, r_max) = r_range(r).unwrap_or((0.0, 1.0));
    let observed: Vec<(f64, f64)> = r.iter().copied().zip(obs.iter().copied()).collect();
    let curve: Vec<(f64, f64)> = r.iter().copied().zip(calc.iter().copied()).collect();
    render_plot(&observed, &curve, r_min, r_max, width, height)
}

/// Render a plot from a saved fit JSON file.
pub fn render_ascii_plot_from_fit_file(fit: &FitFile, width: usize, height: usize) -> String {
    render_ascii_plot(&fit.grid.r, &fit.grid.obs, &fit.grid.calc, width, height)
}

fn render_plot(
    observed: &[(f64, f64)],
    curve: &[(f64, f64)],
    r_min: f64,
    r_max: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (y_min, y_max) = y_range(observed, curve).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so points overlay it.
    draw_curve(&mut grid, curve, r_min, r_max, y_min, y_max);

    for &(r, y) in observed {
        if !y.is_finite() {
            continue;
        }
        let x = map_x(r, r_min, r_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: r=[{r_min:.3}, {r_max:.3}] A | y=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn r_range(r: &[f64]) -> Option<(f64, f64)> {
    let min = r.iter().copied().fold(f64::INFINITY, f64::min);
    let max = r.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else {
        None
    }
}

fn y_range(observed: &[(f64, f64)], curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in observed.iter().chain(curve) {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y_max maps to row 0.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], r_min: f64, r_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(r, y) in curve {
        if !y.is_finite() {
            prev = None;
            continue;
        }
        let x = map_x(r, r_min, r_max, width);
        let row = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, row, '-');
        } else {
            grid[row][x] = '-';
        }
        prev = Some((x, row));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_small() {
        let r = [0.0, 1.0, 2.0, 3.0, 4.0];
        let obs = [0.0, 1.0, 0.0, -1.0, 0.0];
        let calc = [0.0, 0.5, 0.0, -0.5, 0.0];

        let txt = render_ascii_plot(&r, &obs, &calc, 10, 5);
        let expected = concat!(
            "Plot: r=[0.000, 4.000] A | y=[-1.100, 1.100]\n",
            "  o       \n",
            " ---      \n",
            "o   -o  -o\n",
            "      --  \n",
            "       o  \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn flat_signal_falls_back_to_a_unit_range() {
        let txt = render_ascii_plot(&[1.0, 2.0], &[0.0, 0.0], &[0.0, 0.0], 10, 5);
        assert!(txt.starts_with("Plot: r=[1.000, 2.000] A | y=[-0.050, 1.050]\n"));
        assert_eq!(txt.lines().count(), 6);
    }
}
