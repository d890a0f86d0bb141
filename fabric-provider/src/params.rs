//! Generation parameters shared by all providers.

use serde::{Deserialize, Serialize};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";

/// Default upper bound on generated tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Which model to call and how to sample from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct GenerationParams {
    /// Provider-specific model identifier.
    pub model: String,

    /// Maximum number of tokens to generate.
    pub max_tokens: u32,

    /// Sampling temperature in `[0.0, 1.0]`.
    pub temperature: f32,
}

impl GenerationParams {
    /// Parameters for `model` with the default token limit and temperature.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = if temperature.is_nan() {
            DEFAULT_TEMPERATURE
        } else {
            temperature.clamp(0.0, 1.0)
        };
        self
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}
