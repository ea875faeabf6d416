//! Input/output helpers.
//!
//! - structure description JSON (`structure`)
//! - observed-signal CSV ingest + validation (`ingest`)
//! - result and synthetic-data CSV exports (`export`)
//! - fit JSON read/write (`fitfile`)

pub mod export;
pub mod fitfile;
pub mod ingest;
pub mod structure;

pub use export::*;
pub use fitfile::*;
pub use ingest::*;
pub use structure::*;
