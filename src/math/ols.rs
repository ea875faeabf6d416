//! Linear least-squares solves used by the Levenberg–Marquardt step.
//!
//! Every solver iteration reduces to a small linear problem
//!
//! ```text
//! minimize ‖J δ + r‖² + λ ‖D δ‖²
//! ```
//!
//! which we write as one stacked least-squares system
//!
//! ```text
//! [   J   ] δ = [ -r ]
//! [ √λ·D  ]     [  0 ]
//! ```
//!
//! Implementation choices:
//! - We solve with SVD rather than normal equations so near-degenerate
//!   directions (e.g. `φ` at a pole) do not blow up the step.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - The parameter dimension is tiny (5 columns), so SVD cost is negligible
//!   next to a single signal evaluation.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped Gauss–Newton step for Jacobian `jac` and residual `r`.
///
/// `scale` holds the diagonal of `D` (one entry per parameter).
pub fn solve_damped_step(
    jac: &DMatrix<f64>,
    r: &DVector<f64>,
    lambda: f64,
    scale: &[f64],
) -> Option<DVector<f64>> {
    let (m, n) = jac.shape();
    if scale.len() != n || r.len() != m {
        return None;
    }

    let mut a = DMatrix::<f64>::zeros(m + n, n);
    a.view_mut((0, 0), (m, n)).copy_from(jac);
    let sqrt_lambda = lambda.max(0.0).sqrt();
    for (j, &d) in scale.iter().enumerate() {
        a[(m + j, j)] = sqrt_lambda * d;
    }

    let mut b = DVector::<f64>::zeros(m + n);
    for i in 0..m {
        b[i] = -r[i];
    }

    solve_least_squares(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn undamped_step_is_gauss_newton() {
        // r(x) = J x - y at x = 0 gives r = -y, so the step must solve J δ = y.
        let jac = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);
        let r = -y;

        let step = solve_damped_step(&jac, &r, 0.0, &[1.0, 1.0]).unwrap();
        assert!((step[0] - 2.0).abs() < 1e-10);
        assert!((step[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn heavy_damping_shrinks_the_step() {
        let jac = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let r = DVector::from_row_slice(&[-1.0, -1.0]);

        let free = solve_damped_step(&jac, &r, 0.0, &[1.0, 1.0]).unwrap();
        let damped = solve_damped_step(&jac, &r, 1e6, &[1.0, 1.0]).unwrap();
        assert!(damped.norm() < 1e-3 * free.norm());
    }

    #[test]
    fn mismatched_scale_is_rejected() {
        let jac = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let r = DVector::from_row_slice(&[1.0, 1.0]);
        assert!(solve_damped_step(&jac, &r, 1.0, &[1.0]).is_none());
    }
}
