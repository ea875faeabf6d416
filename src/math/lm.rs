//! Box-bounded Levenberg–Marquardt solver.
//!
//! Minimizes `½ Σ r_i(x)²` subject to `lower ≤ x ≤ upper` for a residual
//! callback `x ↦ r(x)`.
//!
//! Algorithm sketch (one iteration):
//! 1. forward-difference Jacobian at the current `x`, every probe kept inside
//!    the box (backward difference near an upper bound, zero column for a
//!    fixed parameter)
//! 2. damped step from `[J; √λ·D] δ = [−r; 0]` (see [`solve_damped_step`])
//! 3. project `x + δ` onto the box and evaluate the trial cost
//! 4. accept and relax `λ` if the cost dropped, otherwise stiffen `λ`
//!
//! The callback is `FnMut` so it can mutate caller-owned state (the spin
//! array) on every evaluation. Calls are strictly sequential.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{AppError, EXIT_CALC, EXIT_INPUT};
use crate::math::solve_damped_step;

/// Solver tuning knobs.
#[derive(Debug, Clone)]
pub struct LmOptions {
    /// Maximum number of outer iterations (Jacobian evaluations).
    pub max_iterations: usize,
    /// Relative cost reduction below which an accepted step counts as converged.
    pub ftol: f64,
    /// Relative step size below which the solver stops.
    pub xtol: f64,
    /// Infinity norm of the projected gradient below which the solver stops.
    pub gtol: f64,
    /// Starting damping.
    pub initial_lambda: f64,
    /// Multiplier applied to `λ` after a rejected step.
    pub lambda_up: f64,
    /// Multiplier applied to `λ` after an accepted step.
    pub lambda_down: f64,
    /// Relative finite-difference step for the Jacobian.
    pub fd_step: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            fd_step: 1e-7,
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmStatus {
    /// Accepted step reduced the cost by less than `ftol` (relative).
    CostConverged,
    /// Step length fell below `xtol` (relative).
    StepConverged,
    /// Projected gradient fell below `gtol`.
    GradientConverged,
    /// Damping grew without finding a downhill step.
    Stalled,
    /// Iteration cap reached.
    MaxIterations,
}

impl LmStatus {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            LmStatus::CostConverged | LmStatus::StepConverged | LmStatus::GradientConverged
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            LmStatus::CostConverged => "converged (cost)",
            LmStatus::StepConverged => "converged (step)",
            LmStatus::GradientConverged => "converged (gradient)",
            LmStatus::Stalled => "stalled",
            LmStatus::MaxIterations => "iteration limit",
        }
    }
}

/// Solver result.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub x: Vec<f64>,
    /// `½‖r‖²` at `x`.
    pub cost: f64,
    pub iterations: usize,
    /// Number of residual evaluations (including Jacobian columns).
    pub evaluations: usize,
    pub status: LmStatus,
}

const LAMBDA_MAX: f64 = 1e16;
const SCALE_FLOOR: f64 = 1e-12;

/// Minimize `½‖f(x)‖²` inside the box `[lower, upper]`, starting at `x0`.
pub fn minimize_bounded<F>(
    mut f: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    opts: &LmOptions,
) -> Result<LmOutcome, AppError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, AppError>,
{
    validate_box(x0, lower, upper)?;

    let n = x0.len();
    let mut x = x0.to_vec();
    let mut evaluations = 0usize;

    let mut r = f(&x)?;
    evaluations += 1;
    let mut cost = half_sum_squares(&r);
    if !cost.is_finite() {
        return Err(AppError::new(
            EXIT_CALC,
            "Residual is not finite at the initial parameters.",
        ));
    }
    let m = r.len();
    if m == 0 {
        return Err(AppError::new(EXIT_INPUT, "Residual vector is empty."));
    }

    let mut lambda = opts.initial_lambda.max(f64::MIN_POSITIVE);
    let mut status = LmStatus::MaxIterations;
    let mut iterations = 0usize;

    'outer: while iterations < opts.max_iterations {
        iterations += 1;

        let jac = forward_jacobian(&mut f, &x, &r, lower, upper, opts.fd_step, &mut evaluations)?;
        let r_vec = DVector::from_column_slice(&r);
        let grad = jac.transpose() * &r_vec;

        if projected_gradient_norm(&x, &grad, lower, upper) < opts.gtol {
            status = LmStatus::GradientConverged;
            break;
        }

        let scale: Vec<f64> = (0..n)
            .map(|j| jac.column(j).norm().max(SCALE_FLOOR))
            .collect();

        // Inner loop: raise λ until a step lowers the cost.
        loop {
            let Some(step) = solve_damped_step(&jac, &r_vec, lambda, &scale) else {
                lambda *= opts.lambda_up;
                if lambda > LAMBDA_MAX {
                    status = LmStatus::Stalled;
                    break 'outer;
                }
                continue;
            };

            let trial = project(&x, step.as_slice(), lower, upper);
            let step_norm = distance(&trial, &x);
            let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
            if step_norm <= opts.xtol * (x_norm + opts.xtol) {
                status = LmStatus::StepConverged;
                break 'outer;
            }

            let r_trial = f(&trial)?;
            evaluations += 1;
            if r_trial.len() != m {
                return Err(AppError::new(
                    EXIT_CALC,
                    format!(
                        "Residual length changed during the fit ({m} -> {}).",
                        r_trial.len()
                    ),
                ));
            }
            let cost_trial = half_sum_squares(&r_trial);

            if cost_trial.is_finite() && cost_trial < cost {
                let reduction = (cost - cost_trial) / cost.max(f64::MIN_POSITIVE);
                x = trial;
                r = r_trial;
                cost = cost_trial;
                lambda = (lambda * opts.lambda_down).max(f64::MIN_POSITIVE);
                debug!(iteration = iterations, cost, lambda, "accepted step");
                if reduction < opts.ftol {
                    status = LmStatus::CostConverged;
                    break 'outer;
                }
                break;
            }

            lambda *= opts.lambda_up;
            if lambda > LAMBDA_MAX {
                status = LmStatus::Stalled;
                break 'outer;
            }
        }
    }

    Ok(LmOutcome {
        x,
        cost,
        iterations,
        evaluations,
        status,
    })
}

fn validate_box(x0: &[f64], lower: &[f64], upper: &[f64]) -> Result<(), AppError> {
    if x0.is_empty() {
        return Err(AppError::new(EXIT_INPUT, "No free parameters to optimize."));
    }
    if lower.len() != x0.len() || upper.len() != x0.len() {
        return Err(AppError::new(
            EXIT_INPUT,
            format!(
                "Bounds length mismatch: x0={}, lower={}, upper={}.",
                x0.len(),
                lower.len(),
                upper.len()
            ),
        ));
    }
    for (i, ((&x, &lo), &hi)) in x0.iter().zip(lower).zip(upper).enumerate() {
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Invalid bounds for parameter {i}: [{lo}, {hi}]."),
            ));
        }
        if !x.is_finite() || x < lo || x > hi {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Initial value {x} for parameter {i} lies outside [{lo}, {hi}]."),
            ));
        }
    }
    Ok(())
}

fn forward_jacobian<F>(
    f: &mut F,
    x: &[f64],
    r0: &[f64],
    lower: &[f64],
    upper: &[f64],
    fd_step: f64,
    evaluations: &mut usize,
) -> Result<DMatrix<f64>, AppError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, AppError>,
{
    let m = r0.len();
    let n = x.len();
    let mut jac = DMatrix::<f64>::zeros(m, n);
    let mut xp = x.to_vec();

    for j in 0..n {
        // Fixed parameters keep a zero column.
        let Some(h) = fd_offset(x[j], lower[j], upper[j], fd_step) else {
            continue;
        };
        xp[j] = (x[j] + h).clamp(lower[j], upper[j]);
        let h = xp[j] - x[j];
        if h == 0.0 {
            xp[j] = x[j];
            continue;
        }
        let rp = f(&xp)?;
        *evaluations += 1;
        xp[j] = x[j];

        if rp.len() != m {
            return Err(AppError::new(
                EXIT_CALC,
                format!("Residual length changed during the fit ({m} -> {}).", rp.len()),
            ));
        }
        for i in 0..m {
            let d = (rp[i] - r0[i]) / h;
            if !d.is_finite() {
                return Err(AppError::new(
                    EXIT_CALC,
                    format!("Non-finite Jacobian entry for parameter {j}."),
                ));
            }
            jac[(i, j)] = d;
        }
    }

    Ok(jac)
}

/// Finite-difference offset that keeps `x + h` inside `[lower, upper]`.
///
/// Steps forward when there is room, backward otherwise, and shrinks to the
/// larger side when the box is narrower than the nominal step. `None` for a
/// zero-width box.
fn fd_offset(x: f64, lower: f64, upper: f64, fd_step: f64) -> Option<f64> {
    let room_up = (upper - x).max(0.0);
    let room_down = (x - lower).max(0.0);
    if room_up <= 0.0 && room_down <= 0.0 {
        return None;
    }
    let h = fd_step * x.abs().max(1.0);
    Some(if room_up >= h {
        h
    } else if room_down >= h {
        -h
    } else if room_up >= room_down {
        room_up
    } else {
        -room_down
    })
}

/// Gradient infinity norm ignoring components that push against an active bound.
fn projected_gradient_norm(x: &[f64], grad: &DVector<f64>, lower: &[f64], upper: &[f64]) -> f64 {
    let mut out = 0.0_f64;
    for j in 0..x.len() {
        let g = grad[j];
        // Descent direction is -g.
        let blocked = (x[j] <= lower[j] && g > 0.0) || (x[j] >= upper[j] && g < 0.0);
        if !blocked {
            out = out.max(g.abs());
        }
    }
    out
}

fn project(x: &[f64], step: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(step)
        .zip(lower.iter().zip(upper))
        .map(|((&xi, &di), (&lo, &hi))| (xi + di).clamp(lo, hi))
        .collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn half_sum_squares(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp_decay_data() -> (Vec<f64>, Vec<f64>) {
        let xs: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let ys = xs.iter().map(|&t| 2.5 * (-1.3 * t).exp()).collect();
        (xs, ys)
    }

    #[test]
    fn recovers_exponential_decay() {
        let (xs, ys) = exp_decay_data();
        let residual = |p: &[f64]| -> Result<Vec<f64>, AppError> {
            Ok(xs
                .iter()
                .zip(&ys)
                .map(|(&t, &y)| y - p[0] * (-p[1] * t).exp())
                .collect())
        };

        let out = minimize_bounded(
            residual,
            &[1.0, 0.5],
            &[0.0, 0.0],
            &[10.0, 10.0],
            &LmOptions::default(),
        )
        .unwrap();

        assert!(out.status.is_converged(), "status: {:?}", out.status);
        assert!((out.x[0] - 2.5).abs() < 1e-6, "amplitude {}", out.x[0]);
        assert!((out.x[1] - 1.3).abs() < 1e-6, "rate {}", out.x[1]);
        assert!(out.cost < 1e-12);
    }

    #[test]
    fn respects_active_bound() {
        // The unconstrained optimum (rate = 1.3) lies above the upper bound.
        let (xs, ys) = exp_decay_data();
        let residual = |p: &[f64]| -> Result<Vec<f64>, AppError> {
            Ok(xs
                .iter()
                .zip(&ys)
                .map(|(&t, &y)| y - p[0] * (-p[1] * t).exp())
                .collect())
        };

        let out = minimize_bounded(
            residual,
            &[1.0, 0.5],
            &[0.0, 0.0],
            &[10.0, 1.0],
            &LmOptions::default(),
        )
        .unwrap();

        assert!(out.x[1] <= 1.0);
        assert!((out.x[1] - 1.0).abs() < 1e-6, "rate should sit on its bound: {}", out.x[1]);
    }

    #[test]
    fn fixed_parameter_is_never_evaluated_off_its_value() {
        // p[1] is pinned to 0; anything below it would be unphysical.
        let (xs, ys) = exp_decay_data();
        let residual = |p: &[f64]| -> Result<Vec<f64>, AppError> {
            if p[1] != 0.0 {
                return Err(AppError::new(EXIT_CALC, format!("left the box: {}", p[1])));
            }
            Ok(xs.iter().zip(&ys).map(|(_, &y)| y - p[0]).collect())
        };

        let out = minimize_bounded(
            residual,
            &[1.0, 0.0],
            &[0.0, 0.0],
            &[10.0, 0.0],
            &LmOptions::default(),
        )
        .unwrap();

        assert!(out.status.is_converged(), "status: {:?}", out.status);
        assert_eq!(out.x[1], 0.0);
        let mean = ys.iter().sum::<f64>() / ys.len() as f64;
        assert!((out.x[0] - mean).abs() < 1e-6, "level {}", out.x[0]);
    }

    #[test]
    fn narrow_box_keeps_jacobian_probes_inside() {
        let (lo, hi) = (0.5, 0.5 + 1e-9);
        let residual = |p: &[f64]| -> Result<Vec<f64>, AppError> {
            if p[0] < lo || p[0] > hi {
                return Err(AppError::new(EXIT_CALC, format!("left the box: {}", p[0])));
            }
            Ok(vec![p[0] - 1.0, 2.0 * (p[0] - 1.0)])
        };

        let out = minimize_bounded(residual, &[lo], &[lo], &[hi], &LmOptions::default()).unwrap();
        assert!(out.x[0] >= lo && out.x[0] <= hi);
    }

    #[test]
    fn fd_offset_picks_the_roomier_side() {
        assert_eq!(fd_offset(0.0, 0.0, 0.0, 1e-7), None);
        assert_eq!(fd_offset(0.5, 0.0, 1.0, 1e-7), Some(1e-7));
        assert_eq!(fd_offset(1.0, 0.0, 1.0, 1e-7), Some(-1e-7));
        assert_eq!(fd_offset(0.0, 0.0, 1e-9, 1e-7), Some(1e-9));
        assert_eq!(fd_offset(1e-9, 0.0, 1e-9, 1e-7), Some(-1e-9));
    }

    #[test]
    fn rejects_start_outside_bounds() {
        let residual = |p: &[f64]| -> Result<Vec<f64>, AppError> { Ok(vec![p[0]]) };
        let err = minimize_bounded(residual, &[2.0], &[0.0], &[1.0], &LmOptions::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
    }

    #[test]
    fn propagates_residual_errors() {
        let residual =
            |_: &[f64]| -> Result<Vec<f64>, AppError> { Err(AppError::new(EXIT_CALC, "boom")) };
        let err = minimize_bounded(residual, &[0.5], &[0.0], &[1.0], &LmOptions::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CALC);
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn non_finite_initial_residual_is_an_error() {
        let residual = |_: &[f64]| -> Result<Vec<f64>, AppError> { Ok(vec![f64::NAN]) };
        let err = minimize_bounded(residual, &[0.5], &[0.0], &[1.0], &LmOptions::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CALC);
    }
}
