//! Magnetic PDF calculator.
//!
//! For central sites `i` and every other site `j` of the cluster:
//!
//! ```text
//! f(r) = 1/N_c Σ_i Σ_{j≠i} [ A_ij / r · G(r − r_ij) + B_ij · r / r_ij³ · Θ(r_ij − r) ]
//!
//! A_ij = S_i·S_j − (S_i·r̂)(S_j·r̂)
//! B_ij = 2 (S_i·r̂)(S_j·r̂) − A_ij
//! ```
//!
//! with `G` a normalized Gaussian of width `gauss_peak_width`. The ordered
//! component is `fr = ord_scale · exp(−(damp_rate·r)^p / 2) · f(r)`; the
//! combined signal adds a paramagnetic self-scattering term
//! `−para_scale · (r / w²) · exp(−r² / 2w²)`.
//!
//! Grid points are independent, so they are evaluated in parallel; the spin
//! array is only read.

use std::f64::consts::PI;

use rayon::prelude::*;

use crate::domain::CalculatorSpec;
use crate::error::{AppError, EXIT_CALC, EXIT_INPUT};
use crate::magnetic::MagStructure;

/// Pairs closer than this are treated as coincident and skipped.
const MIN_PAIR_DISTANCE: f64 = 1e-8;

/// Largest grid [`MpdfCalculator::uniform_grid`] will build.
pub const MAX_GRID_POINTS: usize = 10_000_000;

/// Calculated signal on the calculator grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MpdfSignal {
    pub r: Vec<f64>,
    /// Ordered (damped, scaled) component.
    pub fr: Vec<f64>,
    /// Combined signal: ordered + paramagnetic. This is what gets fitted.
    pub dr: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct PairTerm {
    dist: f64,
    a: f64,
    b: f64,
}

#[derive(Debug, Clone)]
pub struct MpdfCalculator {
    pub ord_scale: f64,
    pub para_scale: f64,
    pub damp_rate: f64,
    pub damp_power: f64,
    pub gauss_peak_width: f64,
    pub para_width: f64,
    r: Vec<f64>,
}

impl MpdfCalculator {
    /// Build a calculator evaluating on the grid `r` (Å).
    pub fn new(spec: &CalculatorSpec, r: Vec<f64>) -> Result<Self, AppError> {
        if r.is_empty() {
            return Err(AppError::new(EXIT_INPUT, "Calculator grid is empty."));
        }
        if r.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(AppError::new(
                EXIT_INPUT,
                "Calculator grid must contain finite, non-negative distances.",
            ));
        }
        for (name, v) in [
            ("gauss_peak_width", spec.gauss_peak_width),
            ("para_width", spec.para_width),
            ("damp_power", spec.damp_power),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(AppError::new(
                    EXIT_INPUT,
                    format!("Calculator setting {name} must be positive, got {v}."),
                ));
            }
        }

        Ok(Self {
            ord_scale: 1.0,
            para_scale: 0.0,
            damp_rate: 0.0,
            damp_power: spec.damp_power,
            gauss_peak_width: spec.gauss_peak_width,
            para_width: spec.para_width,
            r,
        })
    }

    /// Build a uniform grid `[rmin, rmax]` with spacing `rstep`.
    pub fn uniform_grid(rmin: f64, rmax: f64, rstep: f64) -> Result<Vec<f64>, AppError> {
        if !(rmin.is_finite() && rmax.is_finite() && rstep.is_finite())
            || rmin < 0.0
            || rmax <= rmin
            || rstep <= 0.0
        {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Invalid r grid: rmin={rmin}, rmax={rmax}, rstep={rstep}."),
            ));
        }
        let steps = ((rmax - rmin) / rstep + 1e-9).floor();
        if steps >= MAX_GRID_POINTS as f64 {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("r grid [{rmin}, {rmax}] with step {rstep} exceeds {MAX_GRID_POINTS} points."),
            ));
        }
        let n = steps as usize + 1;
        Ok((0..n).map(|i| rmin + i as f64 * rstep).collect())
    }

    pub fn grid(&self) -> &[f64] {
        &self.r
    }

    /// Set the three refined nuisance scalars.
    pub fn set_scalars(&mut self, ord_scale: f64, para_scale: f64, damp_rate: f64) {
        self.ord_scale = ord_scale;
        self.para_scale = para_scale;
        self.damp_rate = damp_rate;
    }

    /// Evaluate the ordered and combined signal for the current spins.
    pub fn calc(&self, magstruc: &MagStructure) -> Result<MpdfSignal, AppError> {
        let pairs = pair_terms(magstruc)?;
        let n_central = magstruc.calc_idxs.len() as f64;
        let sigma = self.gauss_peak_width;
        let gauss_norm = 1.0 / ((2.0 * PI).sqrt() * sigma);
        let w2 = self.para_width * self.para_width;

        let (fr, dr): (Vec<f64>, Vec<f64>) = self
            .r
            .par_iter()
            .map(|&r| {
                let mut f = 0.0;
                for p in &pairs {
                    if r > 0.0 {
                        let x = (r - p.dist) / sigma;
                        if x.abs() < 8.0 {
                            f += p.a / r * gauss_norm * (-0.5 * x * x).exp();
                        }
                    }
                    if p.dist > r {
                        f += p.b * r / (p.dist * p.dist * p.dist);
                    }
                }
                f /= n_central;

                let envelope = (-(self.damp_rate * r).powf(self.damp_power) / 2.0).exp();
                let ordered = self.ord_scale * envelope * f;
                let para = -self.para_scale * (r / w2) * (-r * r / (2.0 * w2)).exp();
                (ordered, ordered + para)
            })
            .unzip();

        if fr.iter().chain(dr.iter()).any(|v| !v.is_finite()) {
            return Err(AppError::new(
                EXIT_CALC,
                "Non-finite value in calculated mPDF signal.",
            ));
        }

        Ok(MpdfSignal {
            r: self.r.clone(),
            fr,
            dr,
        })
    }
}

fn pair_terms(magstruc: &MagStructure) -> Result<Vec<PairTerm>, AppError> {
    let atoms = &magstruc.atoms;
    let spins = &magstruc.spins;
    if atoms.len() != spins.len() {
        return Err(AppError::new(
            EXIT_CALC,
            format!(
                "Structure has {} atoms but {} spins.",
                atoms.len(),
                spins.len()
            ),
        ));
    }
    if magstruc.calc_idxs.is_empty() {
        return Err(AppError::new(EXIT_CALC, "Structure has no central atoms."));
    }

    let mut out = Vec::with_capacity(magstruc.calc_idxs.len() * atoms.len());
    for &i in &magstruc.calc_idxs {
        let (ri, si) = match (atoms.get(i), spins.get(i)) {
            (Some(r), Some(s)) => (r, s),
            _ => {
                return Err(AppError::new(
                    EXIT_CALC,
                    format!("Central atom index {i} is out of range."),
                ));
            }
        };
        for (j, (rj, sj)) in atoms.iter().zip(spins).enumerate() {
            if j == i {
                continue;
            }
            let d = rj - ri;
            let dist = d.norm();
            if dist < MIN_PAIR_DISTANCE {
                continue;
            }
            let rhat = d / dist;
            let si_r = si.dot(&rhat);
            let sj_r = sj.dot(&rhat);
            let a = si.dot(sj) - si_r * sj_r;
            let b = 2.0 * si_r * sj_r - a;
            out.push(PairTerm { dist, a, b });
        }
    }
    Ok(out)
}
