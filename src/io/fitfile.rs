//! Read/write fit JSON files.
//!
//! A fit file is the portable record of one refinement:
//! - strategy, starting point, bounds and refined parameters
//! - solver status and quality metrics
//! - the observed and calculated signal on the fit grid, for replotting
//!
//! The schema is defined by `domain::FitFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{FitFile, FitGrid, ObservedData, ParamBounds, ResidualMode};
use crate::error::{AppError, EXIT_INPUT};
use crate::fit::FitOutcome;

pub const TOOL_NAME: &str = "spinfit";

/// Assemble the serializable record of a finished fit.
pub fn build_fit_file(
    structure: &str,
    mode: ResidualMode,
    bounds: &ParamBounds,
    observed: &ObservedData,
    outcome: &FitOutcome,
) -> FitFile {
    FitFile {
        tool: TOOL_NAME.to_string(),
        created: Utc::now(),
        structure: structure.to_string(),
        mode,
        params: outcome.params,
        initial: outcome.initial,
        bounds: *bounds,
        direction: [outcome.direction.x, outcome.direction.y, outcome.direction.z],
        quality: outcome.quality,
        status: outcome.status,
        iterations: outcome.iterations,
        evaluations: outcome.evaluations,
        grid: FitGrid {
            r: observed.r.clone(),
            obs: observed.y.clone(),
            calc: outcome.signal.dr.clone(),
        },
    }
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, fit: &FitFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, fit)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write fit JSON: {e}")))?;
    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let fit: FitFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(EXIT_INPUT, format!("Invalid fit JSON: {e}")))?;
    if fit.grid.r.len() != fit.grid.obs.len() || fit.grid.r.len() != fit.grid.calc.len() {
        return Err(AppError::new(
            EXIT_INPUT,
            "Invalid fit JSON: grid columns have different lengths.",
        ));
    }
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::MpdfSignal;
    use crate::domain::{FitParams, FitQuality};
    use crate::math::LmStatus;
    use nalgebra::Vector3;

    fn sample_fit() -> FitFile {
        let params = FitParams {
            ord_scale: 1.0,
            para_scale: 0.5,
            damp_rate: 0.05,
            theta: 1.0,
            phi: 0.5,
        };
        let observed = ObservedData {
            r: vec![1.0, 2.0, 3.0],
            y: vec![0.1, 0.2, 0.3],
            column: "dr".to_string(),
        };
        let outcome = FitOutcome {
            params,
            initial: params,
            direction: Vector3::new(0.0, 0.0, 1.0),
            signal: MpdfSignal {
                r: observed.r.clone(),
                fr: vec![0.1, 0.2, 0.3],
                dr: vec![0.1, 0.2, 0.25],
            },
            quality: FitQuality {
                chi2: 0.0025,
                reduced_chi2: 0.0025,
                rw: 0.13,
                n: 3,
                k: 5,
            },
            status: LmStatus::StepConverged,
            iterations: 4,
            evaluations: 29,
        };
        build_fit_file("toy", ResidualMode::Masked, &ParamBounds::default(), &observed, &outcome)
    }

    #[test]
    fn fit_file_serializes_with_lowercase_enums() {
        let fit = sample_fit();
        let json = serde_json::to_string(&fit).unwrap();
        assert!(json.contains("\"mode\":\"masked\""), "{json}");
        assert!(json.contains("\"status\":\"step_converged\""), "{json}");
        assert!(json.contains("\"tool\":\"spinfit\""));

        let back: FitFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.grid.calc, vec![0.1, 0.2, 0.25]);
        assert_eq!(back.params, fit.params);
    }

    #[test]
    fn write_then_read_from_disk() {
        let path = std::env::temp_dir().join(format!("spinfit-fitfile-{}.json", std::process::id()));
        write_fit_json(&path, &sample_fit()).unwrap();
        let back = read_fit_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back.structure, "toy");
        assert_eq!(back.iterations, 4);
    }

    #[test]
    fn ragged_grid_is_rejected() {
        let mut fit = sample_fit();
        fit.grid.calc.pop();
        let path = std::env::temp_dir().join(format!("spinfit-ragged-{}.json", std::process::id()));
        write_fit_json(&path, &fit).unwrap();
        let err = read_fit_json(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert_eq!(err.exit_code(), EXIT_INPUT);
    }
}
