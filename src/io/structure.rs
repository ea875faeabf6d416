//! Structure description JSON.

use std::fs::File;
use std::path::Path;

use crate::domain::StructureFile;
use crate::error::{AppError, EXIT_INPUT};

/// Read a structure description file.
pub fn load_structure(path: &Path) -> Result<StructureFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            EXIT_INPUT,
            format!("Failed to open structure JSON '{}': {e}", path.display()),
        )
    })?;
    serde_json::from_reader(file).map_err(|e| {
        AppError::new(
            EXIT_INPUT,
            format!("Invalid structure JSON '{}': {e}", path.display()),
        )
    })
}
