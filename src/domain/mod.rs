//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the refined parameter vector and its bounds (`FitParams`, `ParamBounds`)
//! - the structure description file (`StructureFile` and its parts)
//! - observed data, fit diagnostics and the saved fit file (`FitFile`)

pub mod types;

pub use types::*;
