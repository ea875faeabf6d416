//! Forward model: magnetic structure → mPDF signal.

pub mod mpdf;

pub use mpdf::*;
