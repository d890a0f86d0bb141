//! Error types for the provider crate.

/// Errors that can occur while talking to an LLM provider.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// No API key was configured for the provider.
    #[error("no API key configured for {provider}; set {env_var} or run `fabric setup`")]
    MissingApiKey { provider: String, env_var: String },

    /// No registered provider serves the requested model.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Transport-level HTTP failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API request failed with status {status}: {reason}")]
    Api { status: u16, reason: String },

    /// The API answered successfully but the body was not understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The event stream failed or reported an error event.
    #[error("stream error: {0}")]
    Stream(String),

    /// JSON encoding or decoding failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Recording the exchange in the session failed.
    #[error(transparent)]
    Session(#[from] fabric_core::CoreError),

    /// Writing the reply to the output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
