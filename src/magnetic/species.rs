//! Magnetic species: atom generation and propagation-vector spin rules.
//!
//! A species owns a handful of unit-cell sites. `make_atoms` replicates them
//! over lattice translations inside a sphere around the origin; `make_spins`
//! assigns every generated site the moment
//!
//! ```text
//! S(x) = Σ_k  basis_k · cos(2π k·x)
//! ```
//!
//! where `x` is the fractional position and `k` the propagation vector in
//! reciprocal lattice units. For commensurate `k` with half-integer components
//! this yields the familiar `±basis` antiferromagnetic patterns.

use std::f64::consts::PI;

use nalgebra::Vector3;

use crate::domain::SpeciesSpec;
use crate::error::{AppError, EXIT_CALC, EXIT_INPUT};
use crate::magnetic::Lattice;

#[derive(Debug, Clone, PartialEq)]
pub struct MagSpecies {
    pub label: String,
    pub symmetry_class: String,
    pub kvecs: Vec<Vector3<f64>>,
    pub basisvecs: Vec<Vector3<f64>>,
    /// Fractional positions of the species' unit-cell sites.
    cell_sites: Vec<Vector3<f64>>,
    /// Generated fractional positions (same order as `atoms`).
    pub fractional: Vec<Vector3<f64>>,
    /// Generated Cartesian positions (Å), sorted by distance from the origin.
    pub atoms: Vec<Vector3<f64>>,
    pub spins: Vec<Vector3<f64>>,
}

impl MagSpecies {
    /// Build a species from its description and the unit-cell site list.
    pub fn from_spec(spec: &SpeciesSpec, cell_atoms: &[[f64; 3]]) -> Result<Self, AppError> {
        if spec.atom_indices.is_empty() {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Species '{}' has no atoms.", spec.label),
            ));
        }
        if spec.kvecs.is_empty() {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Species '{}' has no propagation vectors.", spec.label),
            ));
        }
        if spec.kvecs.len() != spec.basisvecs.len() {
            return Err(AppError::new(
                EXIT_INPUT,
                format!(
                    "Species '{}': {} propagation vectors but {} basis vectors.",
                    spec.label,
                    spec.kvecs.len(),
                    spec.basisvecs.len()
                ),
            ));
        }

        let mut cell_sites = Vec::with_capacity(spec.atom_indices.len());
        for &idx in &spec.atom_indices {
            let xyz = cell_atoms.get(idx).ok_or_else(|| {
                AppError::new(
                    EXIT_INPUT,
                    format!(
                        "Species '{}' references atom {idx}, but the cell has {} atoms.",
                        spec.label,
                        cell_atoms.len()
                    ),
                )
            })?;
            cell_sites.push(Vector3::from(*xyz));
        }

        Ok(Self {
            label: spec.label.clone(),
            symmetry_class: spec.symmetry_class.clone(),
            kvecs: spec.kvecs.iter().map(|k| Vector3::from(*k)).collect(),
            basisvecs: spec.basisvecs.iter().map(|s| Vector3::from(*s)).collect(),
            cell_sites,
            fractional: Vec::new(),
            atoms: Vec::new(),
            spins: Vec::new(),
        })
    }

    /// Generate every site within `rmax` (Å) of the origin.
    pub fn make_atoms(&mut self, lattice: &Lattice, rmax: f64) -> Result<(), AppError> {
        if !(rmax.is_finite() && rmax > 0.0) {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("rmax_atoms must be positive, got {rmax}."),
            ));
        }

        let [na, nb, nc] = lattice.cell_extent(rmax);
        let mut found: Vec<(f64, Vector3<f64>, Vector3<f64>)> = Vec::new();
        for site in &self.cell_sites {
            for i in -na..=na {
                for j in -nb..=nb {
                    for k in -nc..=nc {
                        let frac = site + Vector3::new(i as f64, j as f64, k as f64);
                        let cart = lattice.cartesian(&frac);
                        let d = cart.norm();
                        if d <= rmax {
                            found.push((d, frac, cart));
                        }
                    }
                }
            }
        }

        if found.is_empty() {
            return Err(AppError::new(
                EXIT_CALC,
                format!(
                    "Species '{}' produced no atoms within rmax_atoms={rmax}.",
                    self.label
                ),
            ));
        }

        // Stable sort keeps generation order for equidistant sites.
        found.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        self.fractional = found.iter().map(|(_, f, _)| *f).collect();
        self.atoms = found.into_iter().map(|(_, _, c)| c).collect();
        self.spins.clear();
        Ok(())
    }

    /// Recompute every site spin from the current basis vectors.
    pub fn make_spins(&mut self) -> Result<(), AppError> {
        if self.kvecs.len() != self.basisvecs.len() {
            return Err(AppError::new(
                EXIT_CALC,
                format!(
                    "Species '{}': {} propagation vectors but {} basis vectors.",
                    self.label,
                    self.kvecs.len(),
                    self.basisvecs.len()
                ),
            ));
        }
        if self.fractional.is_empty() {
            return Err(AppError::new(
                EXIT_CALC,
                format!("Species '{}' has no generated atoms; call make_atoms first.", self.label),
            ));
        }

        self.spins.clear();
        self.spins.reserve(self.fractional.len());
        for x in &self.fractional {
            let mut s = Vector3::zeros();
            for (k, basis) in self.kvecs.iter().zip(&self.basisvecs) {
                s += basis * (2.0 * PI * k.dot(x)).cos();
            }
            if !(s.x.is_finite() && s.y.is_finite() && s.z.is_finite()) {
                return Err(AppError::new(
                    EXIT_CALC,
                    format!("Species '{}' produced a non-finite spin.", self.label),
                ));
            }
            self.spins.push(s);
        }
        Ok(())
    }

    /// Replace every basis vector with `direction`.
    pub fn set_basis(&mut self, direction: Vector3<f64>) {
        for b in &mut self.basisvecs {
            *b = direction;
        }
    }

    pub fn n_sites(&self) -> usize {
        self.atoms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LatticeSpec;

    fn cubic(a: f64) -> Lattice {
        Lattice::new(LatticeSpec {
            a,
            b: a,
            c: a,
            alpha: 90.0,
            beta: 90.0,
            gamma: 90.0,
        })
        .unwrap()
    }

    fn g_type_spec() -> SpeciesSpec {
        SpeciesSpec {
            label: "Mn".to_string(),
            symmetry_class: "default".to_string(),
            atom_indices: vec![0],
            kvecs: vec![[0.5, 0.5, 0.5]],
            basisvecs: vec![[0.0, 0.0, 1.0]],
        }
    }

    #[test]
    fn atoms_are_sorted_and_inside_the_sphere() {
        let mut sp = MagSpecies::from_spec(&g_type_spec(), &[[0.0, 0.0, 0.0]]).unwrap();
        sp.make_atoms(&cubic(4.0), 8.5).unwrap();

        assert_eq!(sp.atoms[0], Vector3::zeros());
        let mut prev = 0.0;
        for a in &sp.atoms {
            let d = a.norm();
            assert!(d <= 8.5);
            assert!(d >= prev);
            prev = d;
        }
        // Shells at 0, 4, 4√2, 4√3, 8 plus the (2,1,0)-type shell at √80 ≈ 8.94 excluded.
        assert_eq!(sp.n_sites(), 1 + 6 + 12 + 8 + 6);
    }

    #[test]
    fn g_type_spins_alternate_with_cell_parity() {
        let mut sp = MagSpecies::from_spec(&g_type_spec(), &[[0.0, 0.0, 0.0]]).unwrap();
        sp.make_atoms(&cubic(4.0), 6.0).unwrap();
        sp.make_spins().unwrap();

        for (x, s) in sp.fractional.iter().zip(&sp.spins) {
            let parity = (x.x.round() + x.y.round() + x.z.round()) as i64;
            let expected = if parity.rem_euclid(2) == 0 { 1.0 } else { -1.0 };
            assert!((s - Vector3::new(0.0, 0.0, expected)).norm() < 1e-12);
        }
    }

    #[test]
    fn set_basis_then_regenerate_follows_the_new_direction() {
        let mut sp = MagSpecies::from_spec(&g_type_spec(), &[[0.0, 0.0, 0.0]]).unwrap();
        sp.make_atoms(&cubic(4.0), 5.0).unwrap();
        sp.set_basis(Vector3::new(1.0, 0.0, 0.0));
        sp.make_spins().unwrap();
        for s in &sp.spins {
            assert!(s.y.abs() < 1e-12 && s.z.abs() < 1e-12);
            assert!((s.x.abs() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn mismatched_vectors_are_rejected() {
        let mut spec = g_type_spec();
        spec.basisvecs.push([1.0, 0.0, 0.0]);
        assert!(MagSpecies::from_spec(&spec, &[[0.0, 0.0, 0.0]]).is_err());
    }

    #[test]
    fn unknown_atom_index_is_rejected() {
        let mut spec = g_type_spec();
        spec.atom_indices = vec![3];
        let err = MagSpecies::from_spec(&spec, &[[0.0, 0.0, 0.0]]).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INPUT);
    }

    #[test]
    fn spins_require_generated_atoms() {
        let mut sp = MagSpecies::from_spec(&g_type_spec(), &[[0.0, 0.0, 0.0]]).unwrap();
        assert!(sp.make_spins().is_err());
    }
}
