//! Patterns and the registries they are loaded from.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::CoreError;
use crate::name::validate_name;

/// File inside a pattern directory holding the system prompt.
pub const SYSTEM_PROMPT_FILE: &str = "system.md";

/// A named, reusable system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Pattern {
    /// Directory name the pattern was loaded from (e.g. `"summarize"`).
    pub name: String,
    /// System prompt sent ahead of the conversation.
    pub system: String,
}

impl Pattern {
    /// Creates a pattern from its name and system prompt.
    pub fn new(name: impl Into<String>, system: impl Into<String>) -> Self {
        Self { name: name.into(), system: system.into() }
    }
}

/// A source of patterns.
///
/// Implementations must be `Send + Sync` so a catalog can be shared
/// across async tasks.
pub trait PatternRegistry: Send + Sync {
    /// Names of all patterns this registry can load.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] if the backing store cannot be listed.
    fn pattern_names(&self) -> Result<Vec<String>, CoreError>;

    /// Load a single pattern by name.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidName`] for names that are not a single
    /// path component and [`CoreError::PatternNotFound`] if the registry
    /// has no such pattern.
    fn get_pattern(&self, name: &str) -> Result<Pattern, CoreError>;
}

/// Registry backed by a directory with one sub-directory per pattern.
///
/// ```text
/// patterns/
///   summarize/system.md
///   extract_wisdom/system.md
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryPatternRegistry {
    pattern_dir: PathBuf,
}

impl DirectoryPatternRegistry {
    /// Create a registry rooted at `pattern_dir`. The directory is only
    /// read on demand, so it does not need to exist yet.
    pub fn new(pattern_dir: impl Into<PathBuf>) -> Self {
        Self { pattern_dir: pattern_dir.into() }
    }
}

impl PatternRegistry for DirectoryPatternRegistry {
    #[instrument(skip(self), fields(dir = %self.pattern_dir.display()))]
    fn pattern_names(&self) -> Result<Vec<String>, CoreError> {
        let mut names: Vec<String> = fs::read_dir(&self.pattern_dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
            .collect();
        names.sort();

        debug!(count = names.len(), "listed patterns");
        Ok(names)
    }

    #[instrument(skip(self), fields(dir = %self.pattern_dir.display()))]
    fn get_pattern(&self, name: &str) -> Result<Pattern, CoreError> {
        let name = validate_name(name)?;
        let path = self.pattern_dir.join(name).join(SYSTEM_PROMPT_FILE);

        debug!(path = %path.display(), "reading pattern file");
        match fs::read_to_string(&path) {
            Ok(system) => Ok(Pattern::new(name, system)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CoreError::PatternNotFound { name: name.to_owned() })
            }
            Err(e) => Err(CoreError::Io(e)),
        }
    }
}
