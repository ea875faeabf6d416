//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized (snapshot tests below)

use crate::domain::{FitConfig, ObservedData, PARAM_NAMES, ParamBounds};
use crate::fit::FitOutcome;

/// Relative distance to a bound below which a parameter is flagged.
const AT_BOUND_TOL: f64 = 1e-6;

/// Format the run summary (inputs, solver status, quality metrics).
pub fn format_run_summary(
    structure: &str,
    observed: &ObservedData,
    outcome: &FitOutcome,
    config: &FitConfig,
) -> String {
    let mut out = String::new();

    out.push_str("=== spinfit - mPDF spin direction refinement ===\n");
    out.push_str(&format!("Structure: {structure}\n"));
    out.push_str(&format!(
        "Data: {} | column={} | n={} | r=[{:.3}, {:.3}] A\n",
        config.data_path.display(),
        observed.column,
        observed.len(),
        observed.r.first().copied().unwrap_or(f64::NAN),
        observed.r.last().copied().unwrap_or(f64::NAN),
    ));
    out.push_str(&format!(
        "Strategy: {} | class={} | seed={}\n",
        config.mode.display_name(),
        config.symmetry_class,
        config.seed
    ));

    out.push_str("\nSolver:\n");
    out.push_str(&format!(
        "- status: {} | iterations={} | evaluations={}\n",
        outcome.status.label(),
        outcome.iterations,
        outcome.evaluations
    ));
    let q = &outcome.quality;
    out.push_str(&format!(
        "- chi2={:.6e} | reduced chi2={:.6e} | Rw={:.4}\n",
        q.chi2, q.reduced_chi2, q.rw
    ));
    let d = &outcome.direction;
    out.push_str(&format!(
        "- direction: ({:.4}, {:.4}, {:.4})\n",
        d.x, d.y, d.z
    ));
    out.push('\n');

    out
}

/// Format the parameter table: start, refined value and bounds.
pub fn format_param_table(outcome: &FitOutcome, bounds: &ParamBounds) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<12} {:>12} {:>12} {:>10} {:>10} {:<5}\n",
            "param", "initial", "refined", "lower", "upper", "flag"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<12} {:-<12} {:-<12} {:-<10} {:-<10} {:-<5}\n",
            "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    let initial = outcome.initial.to_array();
    let refined = outcome.params.to_array();
    for (i, name) in PARAM_NAMES.iter().enumerate() {
        let (lo, hi) = (bounds.lower[i], bounds.upper[i]);
        let span = (hi - lo).abs().max(1.0);
        let flag = if (refined[i] - lo).abs() <= AT_BOUND_TOL * span {
            "lo"
        } else if (hi - refined[i]).abs() <= AT_BOUND_TOL * span {
            "hi"
        } else {
            ""
        };
        out.push_str(
            format!(
                "{:<12} {:>12.6} {:>12.6} {:>10.4} {:>10.4} {:<5}\n",
                name, initial[i], refined[i], lo, hi, flag
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}
