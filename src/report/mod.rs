//! Reporting utilities: run summary and parameter table.

pub mod format;

pub use format::*;
