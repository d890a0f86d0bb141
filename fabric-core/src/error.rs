use std::path::PathBuf;

/// Errors produced by the `fabric-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A pattern or session name was empty or tried to escape its directory.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// No registry knows a pattern with this name.
    #[error("pattern not found: {name}")]
    PatternNotFound { name: String },

    /// The catalog was queried before any registry was added.
    #[error("no pattern registries configured")]
    NoRegistries,

    /// A session file exists but could not be decoded.
    #[error("session file {path} is not a valid chat log: {source}")]
    SessionFormat {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A session entry could not be encoded.
    #[error("failed to encode session entry: {0}")]
    Encode(#[from] serde_yaml::Error),

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
