//! Magnetic structure model.
//!
//! - `lattice`: cell geometry (fractional ↔ Cartesian)
//! - `species`: atom generation and propagation-vector spin rules
//! - `structure`: the container holding the flat atom / spin arrays

pub mod lattice;
pub mod species;
pub mod structure;

pub use lattice::*;
pub use species::*;
pub use structure::*;
