//! CSV exports.
//!
//! - fit results: `r,obs,calc,diff,ordered` (one row per grid point)
//! - synthetic observations: `r,dr` (readable by `ingest`)

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::ObservedData;
use crate::error::{AppError, EXIT_INPUT};
use crate::fit::FitOutcome;

/// Write per-point fit results to a CSV file.
pub fn write_results_csv(path: &Path, observed: &ObservedData, outcome: &FitOutcome) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            EXIT_INPUT,
            format!("Failed to create export CSV '{}': {e}", path.display()),
        )
    })?;
    write_results(file, observed, outcome)
}

/// Write per-point fit results as CSV to any writer.
pub fn write_results<W: Write>(mut out: W, observed: &ObservedData, outcome: &FitOutcome) -> Result<(), AppError> {
    let signal = &outcome.signal;
    if signal.dr.len() != observed.len() || signal.fr.len() != observed.len() {
        return Err(AppError::new(
            EXIT_INPUT,
            format!(
                "Cannot export: {} observed points but {} calculated.",
                observed.len(),
                signal.dr.len()
            ),
        ));
    }

    writeln!(out, "r,obs,calc,diff,ordered")
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write export CSV header: {e}")))?;
    for i in 0..observed.len() {
        let obs = observed.y[i];
        let calc = signal.dr[i];
        writeln!(
            out,
            "{:.6},{:.8},{:.8},{:.8},{:.8}",
            observed.r[i],
            obs,
            calc,
            obs - calc,
            signal.fr[i]
        )
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write export CSV row: {e}")))?;
    }
    Ok(())
}

/// Write an `r,dr` observation file.
pub fn write_observed_csv(path: &Path, r: &[f64], y: &[f64]) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::new(
            EXIT_INPUT,
            format!("Failed to create data CSV '{}': {e}", path.display()),
        )
    })?;
    write_observed(&mut file, r, y)
}

pub fn write_observed<W: Write>(mut out: W, r: &[f64], y: &[f64]) -> Result<(), AppError> {
    if r.len() != y.len() {
        return Err(AppError::new(
            EXIT_INPUT,
            format!("Grid has {} points but signal has {}.", r.len(), y.len()),
        ));
    }
    writeln!(out, "r,dr").map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write data CSV: {e}")))?;
    for (rv, yv) in r.iter().zip(y) {
        writeln!(out, "{rv:.6},{yv:.10}")
            .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write data CSV: {e}")))?;
    }
    Ok(())
}
