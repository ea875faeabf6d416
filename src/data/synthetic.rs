//! Synthetic observations from a known spin direction.
//!
//! Used by `spinfit simulate` and by recovery tests: evaluate the forward
//! model at the true parameters on a uniform grid, then add seeded Gaussian
//! noise.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::calc::MpdfCalculator;
use crate::domain::{FitParams, ParamBounds, StructureFile};
use crate::error::{AppError, EXIT_CALC, EXIT_INPUT};
use crate::fit::{FitContext, SpinUpdate, evaluate};
use crate::magnetic::MagStructure;

/// Settings for one synthetic dataset.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub params: FitParams,
    pub symmetry_class: String,
    pub rmin: f64,
    pub rmax: f64,
    pub rstep: f64,
    /// Standard deviation of the additive noise.
    pub noise: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub r: Vec<f64>,
    /// Noise-free combined signal.
    pub clean: Vec<f64>,
    /// `clean` plus noise.
    pub y: Vec<f64>,
}

pub fn simulate(structure: &StructureFile, config: &SimulateConfig) -> Result<SyntheticData, AppError> {
    if !ParamBounds::default().contains(&config.params) {
        return Err(AppError::new(
            EXIT_INPUT,
            format!("True parameters {:?} lie outside the default bounds.", config.params),
        ));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::new(
            EXIT_INPUT,
            format!("Noise level must be >= 0, got {}.", config.noise),
        ));
    }

    let grid = MpdfCalculator::uniform_grid(config.rmin, config.rmax, config.rstep)?;
    let magstruc = MagStructure::from_file(structure)?;
    let calculator = MpdfCalculator::new(&structure.calculator, grid)?;
    let mut ctx = FitContext::new(magstruc, calculator);
    let update = SpinUpdate::Regenerate {
        symmetry_class: config.symmetry_class.clone(),
    };
    let signal = evaluate(&update, &mut ctx, &config.params)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, config.noise)
        .map_err(|e| AppError::new(EXIT_CALC, format!("Noise distribution error: {e}")))?;
    let y = signal
        .dr
        .iter()
        .map(|v| v + normal.sample(&mut rng))
        .collect();

    Ok(SyntheticData {
        r: signal.r,
        clean: signal.dr,
        y,
    })
}
