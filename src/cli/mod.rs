//! Command-line parsing for the mPDF spin-direction refiner.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the physics and fitting code.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::ResidualMode;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "spinfit", version, about = "mPDF spin-direction refinement")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refine the spin direction against observed data, print diagnostics, and optionally plot/export.
    Fit(FitArgs),
    /// Generate a synthetic observation from known parameters.
    Simulate(SimulateArgs),
    /// Plot a previously exported fit JSON.
    Plot(PlotArgs),
    /// Launch the interactive TUI.
    ///
    /// This uses the same refinement pipeline as `spinfit fit`, but renders
    /// results in a terminal UI using Ratatui.
    Tui(FitArgs),
}

/// Options for a refinement run.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Structure description JSON.
    #[arg(short = 's', long, value_name = "JSON")]
    pub structure: PathBuf,

    /// Observed data CSV (`r` plus one of `dr`, `gobs`, `g`, `d`).
    #[arg(short = 'd', long, value_name = "CSV")]
    pub data: PathBuf,

    /// How trial directions are written into the structure.
    #[arg(short = 'm', long, value_enum, default_value_t = ResidualMode::Regenerate)]
    pub mode: ResidualMode,

    /// Symmetry class whose basis vector is refined.
    #[arg(long = "class", default_value = "default")]
    pub symmetry_class: String,

    /// Random seed for the initial guess.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Explicit starting point: ord_scale,para_scale,damp_rate,theta,phi (comma-separated).
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub initial: Option<Vec<f64>>,

    /// Lower bounds: ord_scale,para_scale,damp_rate,theta,phi.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub lower: Option<Vec<f64>>,

    /// Upper bounds: ord_scale,para_scale,damp_rate,theta,phi.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub upper: Option<Vec<f64>>,

    /// Ignore observations below this r (Å).
    #[arg(long)]
    pub rmin: Option<f64>,

    /// Ignore observations above this r (Å).
    #[arg(long)]
    pub rmax: Option<f64>,

    /// Distance to the reference direction below which a site counts as aligned (masked mode).
    #[arg(long, default_value_t = 0.1)]
    pub mask_tolerance: f64,

    /// Reject reference structures that are not two-domain collinear (masked mode).
    #[arg(long)]
    pub strict_collinear: bool,

    /// Exit with an error if the solver does not converge.
    #[arg(long)]
    pub strict_convergence: bool,

    /// Maximum solver iterations.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Relative cost-reduction tolerance.
    #[arg(long, default_value_t = 1e-10)]
    pub ftol: f64,

    /// Relative step tolerance.
    #[arg(long, default_value_t = 1e-10)]
    pub xtol: f64,

    /// Projected-gradient tolerance.
    #[arg(long, default_value_t = 1e-10)]
    pub gtol: f64,

    /// Render an ASCII plot in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export per-point results (r, obs, calc, diff, ordered) to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the fit (parameters + quality + grid) to JSON.
    #[arg(long = "export-fit")]
    pub export_fit: Option<PathBuf>,
}

/// Options for generating synthetic data.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Structure description JSON.
    #[arg(short = 's', long, value_name = "JSON")]
    pub structure: PathBuf,

    /// Output CSV (`r,dr`).
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,

    /// Symmetry class whose basis vector is set.
    #[arg(long = "class", default_value = "default")]
    pub symmetry_class: String,

    #[arg(long, default_value_t = 1.0)]
    pub ord_scale: f64,

    #[arg(long, default_value_t = 1.0)]
    pub para_scale: f64,

    #[arg(long, default_value_t = 0.05)]
    pub damp_rate: f64,

    /// Polar angle (rad).
    #[arg(long, default_value_t = 1.0)]
    pub theta: f64,

    /// Azimuthal angle (rad).
    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    pub phi: f64,

    #[arg(long, default_value_t = 0.5)]
    pub rmin: f64,

    #[arg(long, default_value_t = 20.0)]
    pub rmax: f64,

    #[arg(long, default_value_t = 0.01)]
    pub rstep: f64,

    /// Standard deviation of the additive Gaussian noise.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Options for plotting a saved fit.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Fit JSON file produced by `spinfit fit --export-fit`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}
