//! Residual functions for spin-direction refinement.
//!
//! One evaluation maps a trial parameter vector to `observed − calculated`:
//!
//! 1. turn `(θ, φ)` into a unit direction
//! 2. write that direction into the structure's spin array (strategy-specific)
//! 3. push the three scalars into the calculator
//! 4. compute the signal and subtract it from the observation
//!
//! Two strategies exist for step 2:
//!
//! - [`SpinUpdate::Regenerate`]: set the direction as the basis vector of every
//!   species in a symmetry class and regenerate all spins from the
//!   propagation-vector rules.
//! - [`SpinUpdate::Masked`]: overwrite the stored spins through a fixed
//!   aligned / anti-aligned [`SitePartition`] built once from the reference
//!   configuration. Only valid for two-domain collinear structures.

use nalgebra::Vector3;

use crate::calc::{MpdfCalculator, MpdfSignal};
use crate::domain::{FitParams, ObservedData};
use crate::error::{AppError, EXIT_CALC, EXIT_INPUT};
use crate::magnetic::MagStructure;
use crate::math::spin_direction;

/// Default distance tolerance for building a [`SitePartition`].
pub const DEFAULT_MASK_TOLERANCE: f64 = 0.1;

/// Mutable state shared by every residual evaluation.
///
/// Owned by the fit driver and lent to the residual for the duration of one
/// call.
#[derive(Debug, Clone)]
pub struct FitContext {
    pub magstruc: MagStructure,
    pub calculator: MpdfCalculator,
}

impl FitContext {
    pub fn new(magstruc: MagStructure, calculator: MpdfCalculator) -> Self {
        Self {
            magstruc,
            calculator,
        }
    }
}

/// Fixed split of every site into aligned and anti-aligned index lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePartition {
    aligned: Vec<usize>,
    anti_aligned: Vec<usize>,
}

impl SitePartition {
    /// Build from explicit index lists.
    ///
    /// The lists must be disjoint and together cover `0..n_sites` exactly once.
    pub fn new(
        aligned: Vec<usize>,
        anti_aligned: Vec<usize>,
        n_sites: usize,
    ) -> Result<Self, AppError> {
        let mut seen = vec![false; n_sites];
        for &i in aligned.iter().chain(&anti_aligned) {
            match seen.get_mut(i) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(AppError::new(
                        EXIT_INPUT,
                        format!("Site {i} appears more than once in the partition."),
                    ));
                }
                None => {
                    return Err(AppError::new(
                        EXIT_INPUT,
                        format!("Site {i} is out of range for {n_sites} sites."),
                    ));
                }
            }
        }
        if let Some(missing) = seen.iter().position(|s| !*s) {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Site {missing} is not covered by the partition."),
            ));
        }
        Ok(Self {
            aligned,
            anti_aligned,
        })
    }

    /// Classify each reference spin: within `tolerance` of `reference` is
    /// aligned, everything else anti-aligned.
    pub fn from_reference(spins: &[Vector3<f64>], reference: &Vector3<f64>, tolerance: f64) -> Self {
        let (aligned, anti_aligned): (Vec<usize>, Vec<usize>) =
            (0..spins.len()).partition(|&i| (spins[i] - reference).norm() < tolerance);
        Self {
            aligned,
            anti_aligned,
        }
    }

    /// Fail unless every reference spin lies within `tolerance` of `±reference`.
    pub fn verify_collinear(
        spins: &[Vector3<f64>],
        reference: &Vector3<f64>,
        tolerance: f64,
    ) -> Result<(), AppError> {
        for (i, s) in spins.iter().enumerate() {
            let d = (s - reference).norm().min((s + reference).norm());
            if d >= tolerance {
                return Err(AppError::new(
                    EXIT_CALC,
                    format!(
                        "Site {i} spin ({:.4}, {:.4}, {:.4}) is not collinear with the reference direction; \
                         masked mode needs a two-domain structure.",
                        s.x, s.y, s.z
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn aligned(&self) -> &[usize] {
        &self.aligned
    }

    pub fn anti_aligned(&self) -> &[usize] {
        &self.anti_aligned
    }

    pub fn n_sites(&self) -> usize {
        self.aligned.len() + self.anti_aligned.len()
    }

    /// Write `+direction` to aligned sites and `−direction` to anti-aligned sites.
    pub fn apply(&self, spins: &mut [Vector3<f64>], direction: &Vector3<f64>) -> Result<(), AppError> {
        if spins.len() != self.n_sites() {
            return Err(AppError::new(
                EXIT_CALC,
                format!(
                    "Partition covers {} sites but the structure has {}.",
                    self.n_sites(),
                    spins.len()
                ),
            ));
        }
        for &i in &self.aligned {
            spins[i] = *direction;
        }
        for &i in &self.anti_aligned {
            spins[i] = -*direction;
        }
        Ok(())
    }
}

/// How a trial direction is written into the structure.
#[derive(Debug, Clone, PartialEq)]
pub enum SpinUpdate {
    Regenerate { symmetry_class: String },
    Masked { partition: SitePartition },
}

impl SpinUpdate {
    /// Build the masked strategy from the structure's current (reference) spins.
    pub fn masked_from_reference(
        magstruc: &MagStructure,
        symmetry_class: &str,
        tolerance: f64,
        strict_collinear: bool,
    ) -> Result<Self, AppError> {
        let reference = magstruc.reference_direction(symmetry_class)?;
        if strict_collinear {
            SitePartition::verify_collinear(&magstruc.spins, &reference, tolerance)?;
        }
        Ok(SpinUpdate::Masked {
            partition: SitePartition::from_reference(&magstruc.spins, &reference, tolerance),
        })
    }

    pub fn apply(&self, magstruc: &mut MagStructure, direction: Vector3<f64>) -> Result<(), AppError> {
        match self {
            SpinUpdate::Regenerate { symmetry_class } => {
                magstruc.set_class_basis(symmetry_class, direction)?;
                magstruc.make_spins()
            }
            SpinUpdate::Masked { partition } => partition.apply(&mut magstruc.spins, &direction),
        }
    }
}

/// Write the trial parameters into the context and compute the signal.
pub fn evaluate(
    update: &SpinUpdate,
    ctx: &mut FitContext,
    params: &FitParams,
) -> Result<MpdfSignal, AppError> {
    let direction = spin_direction(params.theta, params.phi);
    update.apply(&mut ctx.magstruc, direction)?;
    ctx.calculator
        .set_scalars(params.ord_scale, params.para_scale, params.damp_rate);
    ctx.calculator.calc(&ctx.magstruc)
}

/// `observed − calculated` for one trial parameter vector.
pub fn residual(
    update: &SpinUpdate,
    ctx: &mut FitContext,
    params: &FitParams,
    observed: &ObservedData,
) -> Result<Vec<f64>, AppError> {
    let signal = evaluate(update, ctx, params)?;
    if signal.dr.len() != observed.y.len() {
        return Err(AppError::new(
            EXIT_INPUT,
            format!(
                "Calculated signal has {} points but the observation has {}.",
                signal.dr.len(),
                observed.y.len()
            ),
        ));
    }
    Ok(observed
        .y
        .iter()
        .zip(&signal.dr)
        .map(|(obs, calc)| obs - calc)
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{AtomSpec, CalculatorSpec, LatticeSpec, SpeciesSpec, StructureFile};

    pub(crate) fn g_type_file() -> StructureFile {
        StructureFile {
            name: "g-type".to_string(),
            lattice: LatticeSpec {
                a: 3.8,
                b: 4.6,
                c: 5.3,
                alpha: 90.0,
                beta: 90.0,
                gamma: 90.0,
            },
            atoms: vec![AtomSpec {
                label: "Mn1".to_string(),
                xyz: [0.0, 0.0, 0.0],
            }],
            species: vec![SpeciesSpec {
                label: "Mn".to_string(),
                symmetry_class: "default".to_string(),
                atom_indices: vec![0],
                kvecs: vec![[0.5, 0.5, 0.5]],
                basisvecs: vec![[0.0, 0.0, 1.0]],
            }],
            rmax_atoms: 11.0,
            calc_radius: 0.0,
            calculator: CalculatorSpec::default(),
        }
    }

    pub(crate) fn g_type_context(grid: Vec<f64>) -> FitContext {
        let file = g_type_file();
        let magstruc = MagStructure::from_file(&file).unwrap();
        let calculator = MpdfCalculator::new(&file.calculator, grid).unwrap();
        FitContext::new(magstruc, calculator)
    }

    fn params(theta: f64, phi: f64) -> FitParams {
        FitParams {
            ord_scale: 1.0,
            para_scale: 0.5,
            damp_rate: 0.05,
            theta,
            phi,
        }
    }

    #[test]
    fn two_site_partition_writes_opposite_spins() {
        let partition = SitePartition::new(vec![0], vec![1], 2).unwrap();
        let mut spins = vec![Vector3::zeros(); 2];
        let dir = spin_direction(0.0, 0.0);
        partition.apply(&mut spins, &dir).unwrap();
        assert_eq!(spins[0], Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(spins[1], Vector3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn partition_lists_are_complementary() {
        let ctx = g_type_context(vec![1.0, 2.0]);
        let reference = ctx.magstruc.reference_direction("default").unwrap();
        let p = SitePartition::from_reference(&ctx.magstruc.spins, &reference, DEFAULT_MASK_TOLERANCE);

        assert_eq!(p.n_sites(), ctx.magstruc.n_sites());
        let mut all: Vec<usize> = p.aligned().iter().chain(p.anti_aligned()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..ctx.magstruc.n_sites()).collect::<Vec<_>>());
        assert!(!p.aligned().is_empty());
        assert!(!p.anti_aligned().is_empty());

        // Round-trips through the validating constructor.
        SitePartition::new(p.aligned().to_vec(), p.anti_aligned().to_vec(), p.n_sites()).unwrap();
    }

    #[test]
    fn partition_rejects_overlap_and_gaps() {
        assert!(SitePartition::new(vec![0, 1], vec![1], 2).is_err());
        assert!(SitePartition::new(vec![0], vec![], 2).is_err());
        assert!(SitePartition::new(vec![0], vec![5], 2).is_err());
    }

    #[test]
    fn apply_rejects_a_partition_of_the_wrong_size() {
        let partition = SitePartition::new(vec![0], vec![1], 2).unwrap();
        let mut spins = vec![Vector3::zeros(); 3];
        let err = partition
            .apply(&mut spins, &Vector3::new(0.0, 0.0, 1.0))
            .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CALC);
    }

    #[test]
    fn masked_and_regenerate_agree_on_a_two_domain_structure() {
        let grid = MpdfCalculator::uniform_grid(0.5, 9.0, 0.05).unwrap();
        let mut ctx_regen = g_type_context(grid.clone());
        let mut ctx_masked = g_type_context(grid);

        let regen = SpinUpdate::Regenerate {
            symmetry_class: "default".to_string(),
        };
        let masked =
            SpinUpdate::masked_from_reference(&ctx_masked.magstruc, "default", DEFAULT_MASK_TOLERANCE, true)
                .unwrap();

        for (theta, phi) in [(0.3, -2.0), (1.0, 0.5), (2.9, 3.0)] {
            let p = params(theta, phi);
            let a = evaluate(&regen, &mut ctx_regen, &p).unwrap();
            let b = evaluate(&masked, &mut ctx_masked, &p).unwrap();
            for (x, y) in a.dr.iter().zip(&b.dr) {
                assert!((x - y).abs() < 1e-10, "regen {x} vs masked {y}");
            }
            for (s1, s2) in ctx_regen.magstruc.spins.iter().zip(&ctx_masked.magstruc.spins) {
                assert!((s1 - s2).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn every_spin_is_plus_or_minus_the_direction() {
        let mut ctx = g_type_context(vec![1.0, 2.0, 3.0]);
        let update = SpinUpdate::Regenerate {
            symmetry_class: "default".to_string(),
        };
        let p = params(1.2, -0.7);
        evaluate(&update, &mut ctx, &p).unwrap();
        let dir = spin_direction(p.theta, p.phi);
        for s in &ctx.magstruc.spins {
            assert!((s - dir).norm() < 1e-12 || (s + dir).norm() < 1e-12);
        }
    }

    #[test]
    fn strict_collinear_rejects_a_canted_reference() {
        let mut file = g_type_file();
        // A second propagation vector cants half the sites off the z axis.
        file.species[0].kvecs.push([0.5, 0.0, 0.0]);
        file.species[0].basisvecs.push([0.5, 0.0, 0.0]);
        let magstruc = MagStructure::from_file(&file).unwrap();

        let err = SpinUpdate::masked_from_reference(&magstruc, "default", DEFAULT_MASK_TOLERANCE, true)
            .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CALC);

        // Silent by default.
        SpinUpdate::masked_from_reference(&magstruc, "default", DEFAULT_MASK_TOLERANCE, false).unwrap();
    }

    #[test]
    fn residual_is_observed_minus_calculated() {
        let grid = vec![1.0, 2.0, 3.8, 5.0];
        let mut ctx = g_type_context(grid.clone());
        let update = SpinUpdate::Regenerate {
            symmetry_class: "default".to_string(),
        };
        let p = params(0.4, 0.1);
        let signal = evaluate(&update, &mut ctx, &p).unwrap();

        let observed = ObservedData {
            r: grid,
            y: vec![0.1, -0.2, 0.3, 0.0],
            column: "dr".to_string(),
        };
        let r = residual(&update, &mut ctx, &p, &observed).unwrap();
        for i in 0..4 {
            assert!((r[i] - (observed.y[i] - signal.dr[i])).abs() < 1e-12);
        }
    }

    #[test]
    fn length_mismatch_is_an_input_error() {
        let mut ctx = g_type_context(vec![1.0, 2.0, 3.0]);
        let update = SpinUpdate::Regenerate {
            symmetry_class: "default".to_string(),
        };
        let observed = ObservedData {
            r: vec![1.0, 2.0],
            y: vec![0.0, 0.0],
            column: "dr".to_string(),
        };
        let err = residual(&update, &mut ctx, &params(0.0, 0.0), &observed).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
    }

    #[test]
    fn unknown_class_propagates_from_the_structure() {
        let mut ctx = g_type_context(vec![1.0, 2.0]);
        let update = SpinUpdate::Regenerate {
            symmetry_class: "missing".to_string(),
        };
        let err = evaluate(&update, &mut ctx, &params(0.0, 0.0)).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CALC);
    }
}
