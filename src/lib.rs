//! `mpdf-spinfit` library crate.
//!
//! Refines the ordered moment direction of a magnetic structure against an
//! observed magnetic pair distribution function. The binary (`spinfit`) is a
//! thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the CLI and TUI share one fitting pipeline

pub mod app;
pub mod calc;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod magnetic;
pub mod math;
pub mod plot;
pub mod report;
pub mod tui;
