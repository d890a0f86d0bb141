//! Error types for the command line front end.

use fabric_core::CoreError;
use fabric_provider::ProviderError;

/// Exit status for failures caused by how the command was invoked.
pub const EXIT_USAGE: u8 = 2;

/// Exit status for every other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Errors that can end a `fabric` invocation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CliError {
    /// A pattern, catalog or session operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Talking to the model failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Nothing was piped on stdin for a command that needs input.
    #[error("no input on stdin; pipe the text to process into fabric")]
    EmptyInput,

    /// The environment or configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Fetching or installing patterns failed.
    #[error("pattern update failed: {0}")]
    Update(String),

    /// Walking the downloaded pattern tree failed.
    #[error("pattern update failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::EmptyInput
            | CliError::Config(_)
            | CliError::Core(
                CoreError::InvalidName { .. }
                | CoreError::PatternNotFound { .. }
                | CoreError::NoRegistries,
            )
            | CliError::Provider(
                ProviderError::UnknownModel(_) | ProviderError::MissingApiKey { .. },
            ) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }
}
