//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - runs the refinement pipeline
//! - generates synthetic observations
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::info;

use crate::cli::{Command, FitArgs, PlotArgs, SimulateArgs};
use crate::data::SimulateConfig;
use crate::domain::{FitConfig, FitParams, ParamBounds};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `spinfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    // The TUI owns the terminal, so it only logs when RUST_LOG asks for it.
    let is_tui = matches!(cli.command, Command::Tui(_));
    crate::logging::init_tracing(cli.verbose, is_tui)?;

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Plot(args) => handle_plot(args),
        Command::Tui(args) => handle_tui(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.structure_name, &run.observed, &run.outcome, &config)
    );
    println!(
        "{}",
        crate::report::format_param_table(&run.outcome, &config.bounds)
    );

    if config.plot {
        let plot = crate::plot::render_ascii_plot(
            &run.observed.r,
            &run.observed.y,
            &run.outcome.signal.dr,
            config.plot_width,
            config.plot_height,
        );
        println!("{plot}");
    }

    // Optional exports.
    if let Some(path) = &config.export_results {
        crate::io::write_results_csv(path, &run.observed, &run.outcome)?;
        info!(path = %path.display(), "wrote results CSV");
    }
    if let Some(path) = &config.export_fit {
        let fit = crate::io::build_fit_file(
            &run.structure_name,
            config.mode,
            &config.bounds,
            &run.observed,
            &run.outcome,
        );
        crate::io::write_fit_json(path, &fit)?;
        info!(path = %path.display(), "wrote fit JSON");
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let structure = crate::io::load_structure(&args.structure)?;
    let config = simulate_config_from_args(&args);
    let data = crate::data::simulate(&structure, &config)?;
    crate::io::write_observed_csv(&args.output, &data.r, &data.y)?;

    println!(
        "Wrote {} points (r=[{:.3}, {:.3}] A, noise={}) to {}",
        data.r.len(),
        data.r.first().copied().unwrap_or(f64::NAN),
        data.r.last().copied().unwrap_or(f64::NAN),
        config.noise,
        args.output.display()
    );
    Ok(())
}

fn handle_tui(args: FitArgs) -> Result<(), AppError> {
    crate::tui::run(args)
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let fit = crate::io::read_fit_json(&args.fit)?;
    let plot = crate::plot::render_ascii_plot_from_fit_file(&fit, args.width, args.height);
    println!("{plot}");
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let initial = args.initial.as_deref().map(FitParams::from_slice).transpose()?;

    let mut bounds = ParamBounds::default();
    if let Some(lower) = &args.lower {
        bounds.lower = FitParams::from_slice(lower)?.to_array();
    }
    if let Some(upper) = &args.upper {
        bounds.upper = FitParams::from_slice(upper)?.to_array();
    }
    bounds.validate()?;

    Ok(FitConfig {
        structure_path: args.structure.clone(),
        data_path: args.data.clone(),
        mode: args.mode,
        symmetry_class: args.symmetry_class.clone(),
        seed: args.seed,
        initial,
        bounds,
        rmin: args.rmin,
        rmax: args.rmax,
        mask_tolerance: args.mask_tolerance,
        strict_collinear: args.strict_collinear,
        strict_convergence: args.strict_convergence,
        max_iterations: args.max_iterations,
        ftol: args.ftol,
        xtol: args.xtol,
        gtol: args.gtol,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_results: args.export.clone(),
        export_fit: args.export_fit.clone(),
    })
}

fn simulate_config_from_args(args: &SimulateArgs) -> SimulateConfig {
    SimulateConfig {
        params: FitParams {
            ord_scale: args.ord_scale,
            para_scale: args.para_scale,
            damp_rate: args.damp_rate,
            theta: args.theta,
            phi: args.phi,
        },
        symmetry_class: args.symmetry_class.clone(),
        rmin: args.rmin,
        rmax: args.rmax,
        rstep: args.rstep,
        noise: args.noise,
        seed: args.seed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::error::EXIT_INPUT;

    fn fit_args(extra: &[&str]) -> FitArgs {
        let mut argv = vec!["spinfit", "fit", "-s", "s.json", "-d", "d.csv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Fit(args) => args,
            other => panic!("expected fit, got {other:?}"),
        }
    }

    #[test]
    fn defaults_produce_full_sphere_bounds_and_random_start() {
        let config = fit_config_from_args(&fit_args(&[])).unwrap();
        assert_eq!(config.bounds, ParamBounds::default());
        assert!(config.initial.is_none());
        assert!(config.plot);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn explicit_vectors_are_mapped_in_order() {
        let config = fit_config_from_args(&fit_args(&[
            "--initial",
            "1,0.5,0.1,1.2,-0.3",
            "--lower",
            "0,0,0,0.5,-1",
            "--upper",
            "2,2,0.5,2,1",
            "--no-plot",
        ]))
        .unwrap();
        let p = config.initial.unwrap();
        assert_eq!(p.theta, 1.2);
        assert_eq!(p.phi, -0.3);
        assert_eq!(config.bounds.lower[3], 0.5);
        assert_eq!(config.bounds.upper[2], 0.5);
        assert!(!config.plot);
    }

    #[test]
    fn initial_needs_five_values() {
        let err = fit_config_from_args(&fit_args(&["--initial", "1,2,3"])).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
        assert!(err.message().contains("Expected 5 parameters, got 3"));
    }

    #[test]
    fn fixed_parameter_bounds_are_accepted() {
        let config = fit_config_from_args(&fit_args(&[
            "--lower",
            "0,0,0,0,-3",
            "--upper",
            "10,10,0,3,3",
        ]))
        .unwrap();
        assert_eq!(config.bounds.lower[2], config.bounds.upper[2]);
    }

    #[test]
    fn inverted_bounds_are_input_errors() {
        let err = fit_config_from_args(&fit_args(&["--lower", "3,0,0,0,-1", "--upper", "2,2,0.5,2,1"])).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
        assert!(err.message().contains("ord_scale"));
    }

    #[test]
    fn simulate_args_map_to_true_parameters() {
        let cli = Cli::try_parse_from([
            "spinfit", "simulate", "-s", "s.json", "-o", "out.csv", "--theta", "0.7", "--noise", "0.01",
        ])
        .unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        let config = simulate_config_from_args(&args);
        assert_eq!(config.params.theta, 0.7);
        assert_eq!(config.params.phi, 0.5);
        assert_eq!(config.noise, 0.01);
        assert_eq!(config.rstep, 0.01);
    }
}
