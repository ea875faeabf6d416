//! Magnetic structure container.
//!
//! Collects the atoms and spins of every species into flat arrays that the
//! calculator reads. The flat spin array is the mutable resource the fit
//! loop writes into; species keep their own copies so a full regeneration can
//! rebuild it from scratch.

use nalgebra::Vector3;

use crate::domain::StructureFile;
use crate::error::{AppError, EXIT_CALC, EXIT_INPUT};
use crate::magnetic::{Lattice, MagSpecies};

/// Slack on the central-atom radius so equidistant sites are not split by rounding.
const CALC_RADIUS_EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct MagStructure {
    pub name: String,
    pub lattice: Lattice,
    pub species: Vec<MagSpecies>,
    pub rmax_atoms: f64,
    pub calc_radius: f64,
    /// Cartesian positions of every generated site, species by species.
    pub atoms: Vec<Vector3<f64>>,
    /// Spin of every generated site (same order as `atoms`).
    pub spins: Vec<Vector3<f64>>,
    /// Sites used as pair origins by the calculator.
    pub calc_idxs: Vec<usize>,
}

impl MagStructure {
    /// Build the structure and generate atoms and spins.
    pub fn from_file(file: &StructureFile) -> Result<Self, AppError> {
        if file.species.is_empty() {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Structure '{}' has no magnetic species.", file.name),
            ));
        }
        if !(file.calc_radius.is_finite() && file.calc_radius >= 0.0) {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("calc_radius must be >= 0, got {}.", file.calc_radius),
            ));
        }

        let lattice = Lattice::new(file.lattice)?;
        let cell_atoms: Vec<[f64; 3]> = file.atoms.iter().map(|a| a.xyz).collect();
        let species = file
            .species
            .iter()
            .map(|s| MagSpecies::from_spec(s, &cell_atoms))
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Self {
            name: file.name.clone(),
            lattice,
            species,
            rmax_atoms: file.rmax_atoms,
            calc_radius: file.calc_radius,
            atoms: Vec::new(),
            spins: Vec::new(),
            calc_idxs: Vec::new(),
        };
        out.make_all()?;
        Ok(out)
    }

    /// Regenerate atoms and spins of every species.
    pub fn make_all(&mut self) -> Result<(), AppError> {
        self.make_atoms()?;
        self.make_spins()
    }

    /// Regenerate atom positions and the central-atom list.
    pub fn make_atoms(&mut self) -> Result<(), AppError> {
        self.atoms.clear();
        for sp in &mut self.species {
            sp.make_atoms(&self.lattice, self.rmax_atoms)?;
            self.atoms.extend_from_slice(&sp.atoms);
        }

        let d_min = self
            .atoms
            .iter()
            .map(|a| a.norm())
            .fold(f64::INFINITY, f64::min);
        if !d_min.is_finite() {
            return Err(AppError::new(EXIT_CALC, "Structure produced no atoms."));
        }
        let cutoff = d_min + self.calc_radius + CALC_RADIUS_EPS;
        self.calc_idxs = self
            .atoms
            .iter()
            .enumerate()
            .filter(|(_, a)| a.norm() <= cutoff)
            .map(|(i, _)| i)
            .collect();
        Ok(())
    }

    /// Regenerate every spin from the species' current basis vectors.
    pub fn make_spins(&mut self) -> Result<(), AppError> {
        self.spins.clear();
        for sp in &mut self.species {
            sp.make_spins()?;
            self.spins.extend_from_slice(&sp.spins);
        }
        if self.spins.len() != self.atoms.len() {
            return Err(AppError::new(
                EXIT_CALC,
                format!(
                    "Spin count {} does not match atom count {}.",
                    self.spins.len(),
                    self.atoms.len()
                ),
            ));
        }
        Ok(())
    }

    /// Set `direction` as the basis vector of every species in `class`.
    ///
    /// Returns the number of species updated. Spins are not regenerated.
    pub fn set_class_basis(&mut self, class: &str, direction: Vector3<f64>) -> Result<usize, AppError> {
        let mut n = 0usize;
        for sp in self.species.iter_mut().filter(|s| s.symmetry_class == class) {
            sp.set_basis(direction);
            n += 1;
        }
        if n == 0 {
            return Err(AppError::new(
                EXIT_CALC,
                format!("No magnetic species in symmetry class '{class}'."),
            ));
        }
        Ok(n)
    }

    /// First basis vector of the first species in `class`.
    pub fn reference_direction(&self, class: &str) -> Result<Vector3<f64>, AppError> {
        self.species
            .iter()
            .find(|s| s.symmetry_class == class)
            .and_then(|s| s.basisvecs.first().copied())
            .ok_or_else(|| {
                AppError::new(
                    EXIT_CALC,
                    format!("No magnetic species in symmetry class '{class}'."),
                )
            })
    }

    pub fn n_sites(&self) -> usize {
        self.atoms.len()
    }
}
