//! Spin-direction refinement.
//!
//! Responsibilities:
//!
//! - write trial directions into the structure (regenerate or masked)
//! - turn a trial parameter vector into `observed − calculated`
//! - drive the bounded least-squares solve and summarize the result

pub mod driver;
pub mod residual;

pub use driver::*;
pub use residual::*;
