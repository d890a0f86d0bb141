//! Core types for the fabric prompt runner.
//!
//! Defines patterns (named system prompts), the registries and catalog
//! they are loaded through, and the chat sessions that record each
//! exchange with a model.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod catalog;
pub mod error;
pub mod name;
pub mod pattern;
pub mod session;

pub use catalog::{extra_pattern_dirs, PatternCatalog};
pub use error::CoreError;
pub use name::validate_name;
pub use pattern::{DirectoryPatternRegistry, Pattern, PatternRegistry, SYSTEM_PROMPT_FILE};
pub use session::{ChatEntry, ChatSession, SessionManager, SESSION_EXTENSION};
