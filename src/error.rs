//! Application error type.
//!
//! Every failure carries the process exit code it maps to, so the binary can
//! report categories without a separate error enum:
//!
//! - `2` invalid input or parameter (files, bounds, grid mismatch)
//! - `3` insufficient data
//! - `4` calculation failure (malformed structure, non-finite signal)
//! - `5` non-convergence (only raised on request)

/// Invalid input files, CLI settings or fit parameters.
pub const EXIT_INPUT: u8 = 2;
/// Not enough observations for the requested fit.
pub const EXIT_DATA: u8 = 3;
/// Structure generation or signal calculation failed.
pub const EXIT_CALC: u8 = 4;
/// The solver stopped without meeting a convergence criterion.
pub const EXIT_NO_CONVERGENCE: u8 = 5;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
