//! LLM provider clients for the fabric prompt runner.
//!
//! Defines the [`Provider`]/[`Client`] seam, the Anthropic Messages API
//! implementation (blocking and streamed), model routing, and the
//! [`Conversation`] driver that records each exchange in a session.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod anthropic;
pub mod client;
pub mod conversation;
pub mod error;
pub mod params;
pub mod registry;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use client::{Client, Provider, Reply, StreamResponse};
pub use conversation::Conversation;
pub use error::ProviderError;
pub use params::{GenerationParams, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
pub use registry::{ModelEntry, ProviderRegistry};
