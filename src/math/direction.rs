//! Spin-direction parameterization.
//!
//! The refined moment direction is expressed by two spherical angles:
//!
//! - polar angle `θ ∈ [0, π]` (measured from +z)
//! - azimuthal angle `φ ∈ [−π, π]` (measured from +x in the xy plane)
//!
//! and mapped to Cartesian components with
//! `v = (sinθ·cosφ, sinθ·sinφ, cosθ)`.
//!
//! Poles are not special-cased: at `θ = 0` every `φ` gives `(0, 0, 1)`, and
//! the optimizer simply sees a flat direction along `φ` there.

use std::f64::consts::PI;

use nalgebra::Vector3;
use rand::Rng;

/// Unit vector for the spherical angles `(theta, phi)`.
pub fn spin_direction(theta: f64, phi: f64) -> Vector3<f64> {
    let (sin_t, cos_t) = theta.sin_cos();
    let (sin_p, cos_p) = phi.sin_cos();
    Vector3::new(sin_t * cos_p, sin_t * sin_p, cos_t)
}

/// Draw `(θ, φ)` uniformly distributed over the unit sphere.
///
/// Sampling `θ` uniformly would crowd points at the poles; drawing
/// `cos θ ~ U(−1, 1)` gives equal density per solid angle.
pub fn sample_sphere_angles<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
    let u: f64 = rng.gen_range(-1.0..=1.0);
    let theta = u.acos();
    let phi = rng.gen_range(-PI..=PI);
    (theta, phi)
}
