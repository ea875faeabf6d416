//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - loaded from / exported to JSON and CSV
//! - reloaded later for plotting or comparisons

use std::f64::consts::PI;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, EXIT_INPUT};
use crate::math::LmStatus;

/// How trial spin directions are written into the structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResidualMode {
    /// Set the shared basis vector and regenerate every site spin.
    Regenerate,
    /// Overwrite spins through a precomputed aligned / anti-aligned partition.
    Masked,
}

impl ResidualMode {
    pub fn display_name(self) -> &'static str {
        match self {
            ResidualMode::Regenerate => "regenerate",
            ResidualMode::Masked => "masked",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ResidualMode::Regenerate => ResidualMode::Masked,
            ResidualMode::Masked => ResidualMode::Regenerate,
        }
    }
}

/// Number of refined parameters.
pub const N_PARAMS: usize = 5;

/// Parameter names in vector order.
pub const PARAM_NAMES: [&str; N_PARAMS] = ["ord_scale", "para_scale", "damp_rate", "theta", "phi"];

/// The refined parameter vector.
///
/// Vector order is `(ord_scale, para_scale, damp_rate, theta, phi)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParams {
    /// Scale of the ordered (correlated) mPDF component.
    pub ord_scale: f64,
    /// Scale of the paramagnetic self-scattering component.
    pub para_scale: f64,
    /// Gaussian damping rate of the ordered component (1/Å).
    pub damp_rate: f64,
    /// Polar angle of the moment direction (rad).
    pub theta: f64,
    /// Azimuthal angle of the moment direction (rad).
    pub phi: f64,
}

impl FitParams {
    pub fn to_array(self) -> [f64; N_PARAMS] {
        [self.ord_scale, self.para_scale, self.damp_rate, self.theta, self.phi]
    }

    /// Build from a parameter slice in vector order.
    pub fn from_slice(values: &[f64]) -> Result<Self, AppError> {
        if values.len() != N_PARAMS {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Expected {N_PARAMS} parameters, got {}.", values.len()),
            ));
        }
        Ok(Self {
            ord_scale: values[0],
            para_scale: values[1],
            damp_rate: values[2],
            theta: values[3],
            phi: values[4],
        })
    }
}

/// Box bounds for [`FitParams`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub lower: [f64; N_PARAMS],
    pub upper: [f64; N_PARAMS],
}

impl Default for ParamBounds {
    fn default() -> Self {
        Self {
            lower: [0.0, 0.0, 0.0, 0.0, -PI],
            upper: [10.0, 10.0, 1.0, PI, PI],
        }
    }
}

impl ParamBounds {
    /// Check that every interval is finite and non-empty.
    pub fn validate(&self) -> Result<(), AppError> {
        for (i, name) in PARAM_NAMES.iter().enumerate() {
            let (lo, hi) = (self.lower[i], self.upper[i]);
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(AppError::new(
                    EXIT_INPUT,
                    format!("Invalid bounds for {name}: [{lo}, {hi}]."),
                ));
            }
        }
        if self.lower[3] < 0.0 || self.upper[3] > PI {
            return Err(AppError::new(EXIT_INPUT, "theta bounds must lie within [0, pi]."));
        }
        if self.lower[4] < -PI || self.upper[4] > PI {
            return Err(AppError::new(EXIT_INPUT, "phi bounds must lie within [-pi, pi]."));
        }
        Ok(())
    }

    pub fn contains(&self, params: &FitParams) -> bool {
        params
            .to_array()
            .iter()
            .enumerate()
            .all(|(i, &v)| v >= self.lower[i] && v <= self.upper[i])
    }
}

/// Lattice parameters (Å, degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeSpec {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    #[serde(default = "right_angle")]
    pub alpha: f64,
    #[serde(default = "right_angle")]
    pub beta: f64,
    #[serde(default = "right_angle")]
    pub gamma: f64,
}

fn right_angle() -> f64 {
    90.0
}

/// One atom of the unit cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomSpec {
    pub label: String,
    /// Fractional coordinates.
    pub xyz: [f64; 3],
}

/// A magnetic species: a set of unit-cell atoms sharing propagation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSpec {
    pub label: String,
    /// Species with the same class share the refined basis vector.
    #[serde(default = "default_class")]
    pub symmetry_class: String,
    /// Indices into [`StructureFile::atoms`].
    pub atom_indices: Vec<usize>,
    /// Propagation vectors (reciprocal lattice units).
    pub kvecs: Vec<[f64; 3]>,
    /// Basis vectors, one per propagation vector.
    pub basisvecs: Vec<[f64; 3]>,
}

pub fn default_class() -> String {
    "default".to_string()
}

/// Calculator settings stored alongside the structure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalculatorSpec {
    /// Standard deviation of the Gaussian pair peaks (Å).
    #[serde(default = "default_peak_width")]
    pub gauss_peak_width: f64,
    /// Width of the paramagnetic self-scattering term (Å).
    #[serde(default = "default_para_width")]
    pub para_width: f64,
    /// Exponent of the damping envelope `exp(-(rate·r)^p / 2)`.
    #[serde(default = "default_damp_power")]
    pub damp_power: f64,
}

fn default_peak_width() -> f64 {
    0.1
}

fn default_para_width() -> f64 {
    1.0
}

fn default_damp_power() -> f64 {
    2.0
}

impl Default for CalculatorSpec {
    fn default() -> Self {
        Self {
            gauss_peak_width: default_peak_width(),
            para_width: default_para_width(),
            damp_power: default_damp_power(),
        }
    }
}

/// A structure description file (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureFile {
    pub name: String,
    pub lattice: LatticeSpec,
    pub atoms: Vec<AtomSpec>,
    pub species: Vec<SpeciesSpec>,
    /// Radius (Å) of the atom cluster generated around the origin.
    pub rmax_atoms: f64,
    /// Atoms within this distance (Å) of the central atom act as pair origins.
    #[serde(default)]
    pub calc_radius: f64,
    #[serde(default)]
    pub calculator: CalculatorSpec,
}

/// Observed signal on its independent-variable grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedData {
    /// Pair distance grid (Å), strictly increasing.
    pub r: Vec<f64>,
    /// Observed signal.
    pub y: Vec<f64>,
    /// Column the signal was read from.
    pub column: String,
}

impl ObservedData {
    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    /// `Σ (obs − calc)²`.
    pub chi2: f64,
    /// `chi2 / (n − k)`.
    pub reduced_chi2: f64,
    /// `sqrt(Σ (obs − calc)² / Σ obs²)`.
    pub rw: f64,
    pub n: usize,
    pub k: usize,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub structure_path: PathBuf,
    pub data_path: PathBuf,
    pub mode: ResidualMode,
    /// Symmetry class whose basis vector is refined.
    pub symmetry_class: String,

    /// Seed for the random initial guess.
    pub seed: u64,
    /// Explicit starting point (skips random sampling).
    pub initial: Option<FitParams>,
    pub bounds: ParamBounds,

    /// Optional r window applied to the observed data.
    pub rmin: Option<f64>,
    pub rmax: Option<f64>,

    /// Distance tolerance used to build the site partition.
    pub mask_tolerance: f64,
    /// Reject reference configurations that are not two-domain collinear.
    pub strict_collinear: bool,
    /// Treat solver non-convergence as an error.
    pub strict_convergence: bool,

    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_results: Option<PathBuf>,
    pub export_fit: Option<PathBuf>,
}

/// A saved fit file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub structure: String,
    pub mode: ResidualMode,
    pub params: FitParams,
    pub initial: FitParams,
    pub bounds: ParamBounds,
    /// Fitted moment direction (Cartesian unit vector).
    pub direction: [f64; 3],
    pub quality: FitQuality,
    pub status: LmStatus,
    pub iterations: usize,
    pub evaluations: usize,
    pub grid: FitGrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitGrid {
    pub r: Vec<f64>,
    pub obs: Vec<f64>,
    pub calc: Vec<f64>,
}
