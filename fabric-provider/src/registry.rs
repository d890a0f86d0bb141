//! Registry routing model names to providers.

use tracing::debug;

use crate::client::{Client, Provider};
use crate::{GenerationParams, ProviderError};

/// A model as advertised by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub provider: String,
    pub model: String,
}

/// Ordered set of providers.
///
/// When more than one provider supports a model, the one registered first
/// is used.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a provider with lower priority than those already present.
    #[must_use]
    pub fn with_provider(mut self, provider: Box<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Every advertised model, in registration order.
    #[must_use]
    pub fn list_models(&self) -> Vec<ModelEntry> {
        self.providers
            .iter()
            .flat_map(|p| {
                p.models().into_iter().map(|model| ModelEntry {
                    provider: p.name().to_owned(),
                    model,
                })
            })
            .collect()
    }

    /// Bind the first provider supporting `params.model`.
    ///
    /// # Errors
    /// Returns [`ProviderError::UnknownModel`] if no provider supports the
    /// model, or the provider's own error if it cannot build a client.
    pub fn client_for(&self, params: &GenerationParams) -> Result<Box<dyn Client>, ProviderError> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.supports(&params.model))
            .ok_or_else(|| ProviderError::UnknownModel(params.model.clone()))?;

        debug!(provider = provider.name(), model = %params.model, "selected provider");
        provider.client(params)
    }
}
