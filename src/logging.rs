//! Tracing subscriber setup.
//!
//! Log events go to stderr so stdout stays clean for reports and plots.
//! `RUST_LOG` (optionally from a `.env` file) overrides the `-v` level.

use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{AppError, EXIT_INPUT};

/// Install the global subscriber.
///
/// With `silent_without_env` set, nothing is logged unless `RUST_LOG` is
/// present; the TUI uses this to keep the alternate screen intact.
pub fn init_tracing(verbose: u8, silent_without_env: bool) -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    let env_set = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    let filter = if silent_without_env && !env_set {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal());

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to initialize logging: {e}")))
}

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(default_directive(0), "info");
        assert_eq!(default_directive(1), "debug");
        assert_eq!(default_directive(5), "trace");
    }
}
