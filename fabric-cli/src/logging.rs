//! stderr logging setup.

use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Install the global subscriber.
///
/// `level` is always validated; `RUST_LOG` wins over it when set and
/// valid. Output goes to stderr so that stdout carries only model replies.
/// An already installed subscriber is kept.
///
/// # Errors
/// Returns [`CliError::Config`] if `level` is not a valid filter.
pub fn init(level: &str) -> Result<(), CliError> {
    let requested = parse_filter(level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or(requested);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if let Err(e) = installed {
        tracing::debug!(error = %e, "keeping existing subscriber");
    }
    Ok(())
}

/// Parse a `tracing` filter directive such as `info` or `fabric_core=debug`.
///
/// # Errors
/// Returns [`CliError::Config`] if the directive does not parse.
pub fn parse_filter(level: &str) -> Result<EnvFilter, CliError> {
    EnvFilter::try_new(level).map_err(|e| CliError::Config(format!("invalid log level '{level}': {e}")))
}
