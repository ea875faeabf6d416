//! Crystal lattice geometry.
//!
//! Convention: `a` along +x, `b` in the xy plane, `c` completing a
//! right-handed cell. Cartesian positions are `M · x_frac` with the lattice
//! vectors as the columns of `M`.

use nalgebra::{Matrix3, Vector3};

use crate::domain::LatticeSpec;
use crate::error::{AppError, EXIT_INPUT};

#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    spec: LatticeSpec,
    basis: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Lattice {
    pub fn new(spec: LatticeSpec) -> Result<Self, AppError> {
        let LatticeSpec {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        } = spec;
        for (name, v) in [("a", a), ("b", b), ("c", c)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(AppError::new(
                    EXIT_INPUT,
                    format!("Lattice length {name} must be positive, got {v}."),
                ));
            }
        }
        for (name, v) in [("alpha", alpha), ("beta", beta), ("gamma", gamma)] {
            if !(v.is_finite() && v > 0.0 && v < 180.0) {
                return Err(AppError::new(
                    EXIT_INPUT,
                    format!("Lattice angle {name} must lie in (0, 180), got {v}."),
                ));
            }
        }

        let (ca, cb, cg) = (
            alpha.to_radians().cos(),
            beta.to_radians().cos(),
            gamma.to_radians().cos(),
        );
        let sg = gamma.to_radians().sin();

        let cx = c * cb;
        let cy = c * (ca - cb * cg) / sg;
        let cz2 = c * c - cx * cx - cy * cy;
        if cz2 <= 0.0 {
            return Err(AppError::new(
                EXIT_INPUT,
                format!("Lattice angles ({alpha}, {beta}, {gamma}) do not form a valid cell."),
            ));
        }

        let basis = Matrix3::new(
            a, b * cg, cx, //
            0.0, b * sg, cy, //
            0.0, 0.0, cz2.sqrt(),
        );
        let inverse = basis
            .try_inverse()
            .ok_or_else(|| AppError::new(EXIT_INPUT, "Lattice matrix is singular."))?;

        Ok(Self {
            spec,
            basis,
            inverse,
        })
    }

    pub fn spec(&self) -> LatticeSpec {
        self.spec
    }

    /// Fractional → Cartesian (Å).
    pub fn cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.basis * frac
    }

    /// Cartesian (Å) → fractional.
    pub fn fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * cart
    }

    /// Number of cells needed along each axis to cover a sphere of radius `rmax`.
    ///
    /// Uses the interplanar spacings `d_i = 1 / |row_i(M⁻¹)|`.
    pub fn cell_extent(&self, rmax: f64) -> [i64; 3] {
        let mut out = [0i64; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            let inv_d = self.inverse.row(i).norm();
            *slot = (rmax * inv_d).ceil() as i64 + 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(a: f64, b: f64, c: f64, gamma: f64) -> LatticeSpec {
        LatticeSpec {
            a,
            b,
            c,
            alpha: 90.0,
            beta: 90.0,
            gamma,
        }
    }

    #[test]
    fn orthorhombic_cell_is_diagonal() {
        let lat = Lattice::new(spec(3.0, 4.0, 5.0, 90.0)).unwrap();
        let v = lat.cartesian(&Vector3::new(1.0, 1.0, 1.0));
        assert!((v - Vector3::new(3.0, 4.0, 5.0)).norm() < 1e-12);
    }

    #[test]
    fn hexagonal_b_axis_is_rotated() {
        let lat = Lattice::new(spec(2.0, 2.0, 3.0, 120.0)).unwrap();
        let b = lat.cartesian(&Vector3::new(0.0, 1.0, 0.0));
        assert!((b.x + 1.0).abs() < 1e-12);
        assert!((b.y - 3.0_f64.sqrt()).abs() < 1e-12);
        assert!((b.norm() - 2.0).abs() < 1e-12);

        let back = lat.fractional(&b);
        assert!((back - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn rejects_degenerate_lengths() {
        assert!(Lattice::new(spec(0.0, 1.0, 1.0, 90.0)).is_err());
        assert!(Lattice::new(spec(1.0, 1.0, 1.0, 180.0)).is_err());
    }

    #[test]
    fn extent_covers_the_radius() {
        let lat = Lattice::new(spec(3.0, 4.0, 5.0, 90.0)).unwrap();
        let ext = lat.cell_extent(10.0);
        assert_eq!(ext, [5, 4, 3]);
    }
}
