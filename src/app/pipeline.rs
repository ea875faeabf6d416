//! Shared "fit pipeline" logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load structure + data -> build fit context -> pick strategy -> initial guess -> refine
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::calc::MpdfCalculator;
use crate::domain::{FitConfig, ObservedData, ResidualMode, StructureFile};
use crate::error::{AppError, EXIT_INPUT};
use crate::fit::{FitContext, FitOutcome, RefineOptions, SpinUpdate, initial_guess, refine};
use crate::magnetic::MagStructure;
use crate::math::LmOptions;

/// Parsed inputs, loaded once and reused across refits.
#[derive(Debug, Clone)]
pub struct FitInputs {
    pub structure: StructureFile,
    pub observed: ObservedData,
}

/// All computed outputs of a single `spinfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub structure_name: String,
    pub observed: ObservedData,
    pub outcome: FitOutcome,
}

/// Load the structure description and the observed data named by `config`.
pub fn load_inputs(config: &FitConfig) -> Result<FitInputs, AppError> {
    let structure = crate::io::load_structure(&config.structure_path)?;
    let observed = crate::io::load_observed(&config.data_path, config.rmin, config.rmax)?;
    Ok(FitInputs {
        structure,
        observed,
    })
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    let inputs = load_inputs(config)?;
    run_fit_with_inputs(config, &inputs)
}

/// Execute the fitting pipeline with pre-loaded inputs.
///
/// This is useful for the TUI where we want to refit without re-reading files.
pub fn run_fit_with_inputs(config: &FitConfig, inputs: &FitInputs) -> Result<RunOutput, AppError> {
    if !(config.mask_tolerance.is_finite() && config.mask_tolerance > 0.0) {
        return Err(AppError::new(
            EXIT_INPUT,
            format!("Mask tolerance must be positive, got {}.", config.mask_tolerance),
        ));
    }
    config.bounds.validate()?;

    // 1) Fit context: fresh structure + calculator on the observed grid.
    let magstruc = MagStructure::from_file(&inputs.structure)?;
    let calculator = MpdfCalculator::new(&inputs.structure.calculator, inputs.observed.r.clone())?;
    let mut ctx = FitContext::new(magstruc, calculator);

    // 2) Strategy. The masked partition is built here, once, from the reference spins.
    let update = match config.mode {
        ResidualMode::Regenerate => SpinUpdate::Regenerate {
            symmetry_class: config.symmetry_class.clone(),
        },
        ResidualMode::Masked => SpinUpdate::masked_from_reference(
            &ctx.magstruc,
            &config.symmetry_class,
            config.mask_tolerance,
            config.strict_collinear,
        )?,
    };

    // 3) Starting point.
    let initial = match config.initial {
        Some(p) => p,
        None => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            initial_guess(&mut rng, &config.bounds)
        }
    };

    // 4) Refine.
    let opts = RefineOptions {
        lm: LmOptions {
            max_iterations: config.max_iterations,
            ftol: config.ftol,
            xtol: config.xtol,
            gtol: config.gtol,
            ..LmOptions::default()
        },
        strict_convergence: config.strict_convergence,
    };
    let outcome = refine(&update, &mut ctx, &inputs.observed, &config.bounds, initial, &opts)?;

    Ok(RunOutput {
        structure_name: inputs.structure.name.clone(),
        observed: inputs.observed.clone(),
        outcome,
    })
}
