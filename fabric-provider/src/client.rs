//! Provider and client abstraction traits.
//!
//! A [`Provider`] describes an LLM vendor and the models it serves; a
//! [`Client`] is a provider bound to one model and one set of
//! [`GenerationParams`], ready to answer a conversation.

use async_trait::async_trait;
use fabric_core::{ChatEntry, Pattern};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{GenerationParams, ProviderError};

/// A complete, non-streamed model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Concatenated text of the reply.
    pub body: String,
    /// Provider metadata (ids, stop reason, token usage).
    pub meta: Value,
}

/// A reply delivered incrementally.
///
/// `rx` yields text fragments in order and closes when the model is done.
/// An `Err` item means the stream failed; no further items follow it.
#[derive(Debug)]
pub struct StreamResponse {
    /// Metadata known when the stream was opened.
    pub meta: Value,
    pub rx: mpsc::Receiver<Result<String, ProviderError>>,
}

/// An LLM vendor.
pub trait Provider: Send + Sync {
    /// Short identifier, e.g. `"anthropic"`.
    fn name(&self) -> &str;

    /// Models this provider advertises.
    fn models(&self) -> Vec<String>;

    /// Whether `model` can be served by this provider.
    fn supports(&self, model: &str) -> bool {
        self.models().iter().any(|m| m == model)
    }

    /// Bind the provider to `params`.
    ///
    /// # Errors
    /// Returns [`ProviderError::MissingApiKey`] if the provider is not
    /// configured, or [`ProviderError::UnknownModel`] if it cannot serve
    /// `params.model`.
    fn client(&self, params: &GenerationParams) -> Result<Box<dyn Client>, ProviderError>;
}

/// A provider bound to a model.
///
/// `history` is the whole conversation so far, ending with the user query
/// to answer. [`ChatEntry::Unknown`] entries must be skipped.
///
/// # Cancel Safety
/// Both methods are cancel safe. Dropping a [`StreamResponse`] receiver
/// stops the background consumer at its next event.
#[async_trait]
pub trait Client: Send + Sync {
    /// Send the conversation and wait for the full reply.
    ///
    /// # Errors
    /// Returns [`ProviderError::Http`] on transport failure,
    /// [`ProviderError::Api`] on a non-success status and
    /// [`ProviderError::MalformedResponse`] if the body is not understood.
    async fn send_message(
        &self,
        pattern: &Pattern,
        history: &[ChatEntry],
    ) -> Result<Reply, ProviderError>;

    /// Send the conversation and receive the reply as it is generated.
    ///
    /// # Errors
    /// Returns [`ProviderError::Stream`] if the stream cannot be opened.
    async fn stream_message(
        &self,
        pattern: &Pattern,
        history: &[ChatEntry],
    ) -> Result<StreamResponse, ProviderError>;
}
