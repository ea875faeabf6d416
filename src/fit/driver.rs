//! Optimization driver.
//!
//! Wraps a residual strategy, a starting point and the parameter box into a
//! single bounded least-squares solve, then recomputes the signal once at the
//! converged parameters. There is no retry: the solver status is reported as
//! is and only turned into an error when the caller asks for it.

use std::f64::consts::PI;

use nalgebra::Vector3;
use rand::Rng;
use tracing::{info, warn};

use crate::calc::MpdfSignal;
use crate::domain::{FitParams, FitQuality, N_PARAMS, ObservedData, ParamBounds};
use crate::error::{AppError, EXIT_DATA, EXIT_NO_CONVERGENCE};
use crate::fit::residual::{FitContext, SpinUpdate, evaluate, residual};
use crate::math::{LmOptions, LmStatus, minimize_bounded, sample_sphere_angles, spin_direction};

/// Driver settings that are not part of the parameter box.
#[derive(Debug, Clone, Default)]
pub struct RefineOptions {
    pub lm: LmOptions,
    /// Return an error when the solver stops without converging.
    pub strict_convergence: bool,
}

/// Result of one refinement.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub params: FitParams,
    pub initial: FitParams,
    /// Unit moment direction at `params`.
    pub direction: Vector3<f64>,
    /// Signal recomputed at `params`.
    pub signal: MpdfSignal,
    pub quality: FitQuality,
    pub status: LmStatus,
    pub iterations: usize,
    pub evaluations: usize,
}

/// Draw a starting point inside `bounds`.
///
/// Scalars are uniform within their bounds. The direction is uniform over the
/// part of the sphere the angle bounds allow: `cos θ` is drawn uniformly, so
/// with the default bounds this is `θ = arccos(U(−1, 1))`, `φ = U(−π, π)`.
pub fn initial_guess<R: Rng + ?Sized>(rng: &mut R, bounds: &ParamBounds) -> FitParams {
    let lo = bounds.lower;
    let hi = bounds.upper;
    let ord_scale = rng.gen_range(lo[0]..=hi[0]);
    let para_scale = rng.gen_range(lo[1]..=hi[1]);
    let damp_rate = rng.gen_range(lo[2]..=hi[2]);

    let full_sphere = lo[3] <= 0.0 && hi[3] >= PI && lo[4] <= -PI && hi[4] >= PI;
    let (theta, phi) = if full_sphere {
        sample_sphere_angles(rng)
    } else {
        let u = rng.gen_range(hi[3].cos()..=lo[3].cos());
        (u.acos().clamp(lo[3], hi[3]), rng.gen_range(lo[4]..=hi[4]))
    };

    FitParams {
        ord_scale,
        para_scale,
        damp_rate,
        theta,
        phi,
    }
}

/// Refine `(ord_scale, para_scale, damp_rate, θ, φ)` against `observed`.
pub fn refine(
    update: &SpinUpdate,
    ctx: &mut FitContext,
    observed: &ObservedData,
    bounds: &ParamBounds,
    initial: FitParams,
    opts: &RefineOptions,
) -> Result<FitOutcome, AppError> {
    bounds.validate()?;
    if observed.len() <= N_PARAMS {
        return Err(AppError::new(
            EXIT_DATA,
            format!(
                "Need more than {N_PARAMS} observations to refine {N_PARAMS} parameters, got {}.",
                observed.len()
            ),
        ));
    }

    info!(
        points = observed.len(),
        strategy = strategy_name(update),
        ord_scale = initial.ord_scale,
        para_scale = initial.para_scale,
        damp_rate = initial.damp_rate,
        theta = initial.theta,
        phi = initial.phi,
        "starting refinement"
    );

    let lm = minimize_bounded(
        |x: &[f64]| {
            let p = FitParams::from_slice(x)?;
            residual(update, ctx, &p, observed)
        },
        &initial.to_array(),
        &bounds.lower,
        &bounds.upper,
        &opts.lm,
    )?;

    let params = FitParams::from_slice(&lm.x)?;
    let signal = evaluate(update, ctx, &params)?;
    let quality = fit_quality(&observed.y, &signal.dr, N_PARAMS);

    info!(
        status = lm.status.label(),
        iterations = lm.iterations,
        evaluations = lm.evaluations,
        chi2 = quality.chi2,
        rw = quality.rw,
        "refinement finished"
    );

    if !lm.status.is_converged() {
        warn!(status = lm.status.label(), "solver stopped without converging");
        if opts.strict_convergence {
            return Err(AppError::new(
                EXIT_NO_CONVERGENCE,
                format!(
                    "Refinement did not converge ({}) after {} iterations.",
                    lm.status.label(),
                    lm.iterations
                ),
            ));
        }
    }

    Ok(FitOutcome {
        params,
        initial,
        direction: spin_direction(params.theta, params.phi),
        signal,
        quality,
        status: lm.status,
        iterations: lm.iterations,
        evaluations: lm.evaluations,
    })
}

/// χ², reduced χ² and Rw of `calc` against `obs` with `k` free parameters.
pub fn fit_quality(obs: &[f64], calc: &[f64], k: usize) -> FitQuality {
    let n = obs.len().min(calc.len());
    let chi2: f64 = obs
        .iter()
        .zip(calc)
        .map(|(o, c)| (o - c) * (o - c))
        .sum();
    let norm: f64 = obs.iter().take(n).map(|o| o * o).sum();

    let dof = n.saturating_sub(k);
    let reduced_chi2 = if dof > 0 { chi2 / dof as f64 } else { f64::INFINITY };
    let rw = if norm > 0.0 {
        (chi2 / norm).sqrt()
    } else if chi2 == 0.0 {
        0.0
    } else {
        f64::INFINITY
    };

    FitQuality {
        chi2,
        reduced_chi2,
        rw,
        n,
        k,
    }
}

fn strategy_name(update: &SpinUpdate) -> &'static str {
    match update {
        SpinUpdate::Regenerate { .. } => "regenerate",
        SpinUpdate::Masked { .. } => "masked",
    }
}
