//! Numerical building blocks: spin-direction parameterization, linear
//! least-squares steps and the bounded Levenberg–Marquardt solver.

pub mod direction;
pub mod lm;
pub mod ols;

pub use direction::*;
pub use lm::*;
pub use ols::*;
