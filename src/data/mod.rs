//! Data sources other than files on disk.

pub mod synthetic;

pub use synthetic::*;
