//! Ordered collection of pattern registries.

use std::path::PathBuf;

use tracing::{debug, instrument};

use crate::error::CoreError;
use crate::pattern::{DirectoryPatternRegistry, Pattern, PatternRegistry};

/// Looks patterns up across several registries.
///
/// Registries are consulted in the order they were added; the first one
/// that can load a pattern wins.
#[derive(Default)]
pub struct PatternCatalog {
    registries: Vec<Box<dyn PatternRegistry>>,
}

impl PatternCatalog {
    /// A catalog with no registries.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A catalog over `base` followed by each of `extras`.
    pub fn from_dirs<I>(base: impl Into<PathBuf>, extras: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        extras.into_iter().fold(
            Self::empty().with_registry(Box::new(DirectoryPatternRegistry::new(base))),
            |catalog, dir| catalog.with_registry(Box::new(DirectoryPatternRegistry::new(dir))),
        )
    }

    /// Append a registry with lower priority than those already present.
    #[must_use]
    pub fn with_registry(mut self, registry: Box<dyn PatternRegistry>) -> Self {
        self.registries.push(registry);
        self
    }

    /// Number of registries in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registries.len()
    }

    /// Returns `true` if no registries have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// Sorted, de-duplicated names across all registries.
    ///
    /// Registries that fail to list (e.g. a directory that does not exist
    /// yet) are skipped.
    ///
    /// # Errors
    /// Returns [`CoreError::NoRegistries`] if the catalog is empty.
    #[instrument(skip(self), fields(registries = self.registries.len()))]
    pub fn list_patterns(&self) -> Result<Vec<String>, CoreError> {
        if self.registries.is_empty() {
            return Err(CoreError::NoRegistries);
        }

        let mut all: Vec<String> = self
            .registries
            .iter()
            .map(|r| r.pattern_names())
            .filter_map(|r| {
                r.inspect_err(|e| debug!(error = %e, "failed to list registry"))
                    .ok()
            })
            .flatten()
            .collect();
        all.sort();
        all.dedup();

        Ok(all)
    }

    /// Load `name` from the first registry that has it.
    ///
    /// # Errors
    /// Returns [`CoreError::NoRegistries`] if the catalog is empty, or the
    /// error from the last registry consulted if none had the pattern.
    #[instrument(skip(self))]
    pub fn get_pattern(&self, name: &str) -> Result<Pattern, CoreError> {
        let mut result = Err(CoreError::NoRegistries);
        for registry in &self.registries {
            result = registry.get_pattern(name);
            match &result {
                Ok(_) => return result,
                Err(CoreError::InvalidName { .. }) => return result,
                Err(e) => debug!(error = %e, "pattern not in registry"),
            }
        }
        result
    }
}

/// Parse a `;`-separated list of extra pattern directories.
///
/// Each entry is shell-expanded (`~`, `$VAR`). Empty entries, entries
/// that fail to expand and paths that are not existing directories are
/// dropped.
#[must_use]
pub fn extra_pattern_dirs(spec: &str) -> Vec<PathBuf> {
    spec.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            shellexpand::full(s)
                .inspect_err(|e| debug!(entry = s, error = %e, "cannot expand pattern path"))
                .ok()
        })
        .map(|s| PathBuf::from(s.into_owned()))
        .filter(|p| p.is_dir())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::pattern::SYSTEM_PROMPT_FILE;

    struct FixedRegistry(Vec<Pattern>);

    impl PatternRegistry for FixedRegistry {
        fn pattern_names(&self) -> Result<Vec<String>, CoreError> {
            Ok(self.0.iter().map(|p| p.name.clone()).collect())
        }

        fn get_pattern(&self, name: &str) -> Result<Pattern, CoreError> {
            self.0
                .iter()
                .find(|p| p.name == name)
                .cloned()
                .ok_or_else(|| CoreError::PatternNotFound { name: name.to_owned() })
        }
    }

    struct BrokenRegistry;

    impl PatternRegistry for BrokenRegistry {
        fn pattern_names(&self) -> Result<Vec<String>, CoreError> {
            Err(CoreError::Io(std::io::Error::other("disk on fire")))
        }

        fn get_pattern(&self, _name: &str) -> Result<Pattern, CoreError> {
            Err(CoreError::Io(std::io::Error::other("disk on fire")))
        }
    }

    fn fixed(patterns: &[(&str, &str)]) -> Box<dyn PatternRegistry> {
        Box::new(FixedRegistry(
            patterns.iter().map(|(n, s)| Pattern::new(*n, *s)).collect(),
        ))
    }

    #[test]
    fn empty_catalog_reports_no_registries() {
        let catalog = PatternCatalog::empty();
        assert!(catalog.is_empty());
        assert!(matches!(catalog.list_patterns(), Err(CoreError::NoRegistries)));
        assert!(matches!(catalog.get_pattern("x"), Err(CoreError::NoRegistries)));
    }

    #[test]
    fn list_patterns_merges_sorts_and_dedups() {
        let catalog = PatternCatalog::empty()
            .with_registry(fixed(&[("summarize", "a"), ("rate", "b")]))
            .with_registry(Box::new(BrokenRegistry))
            .with_registry(fixed(&[("summarize", "c"), ("ask", "d")]));

        let names = match catalog.list_patterns() {
            Ok(n) => n,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert_eq!(names, vec!["ask", "rate", "summarize"]);
    }

    #[test]
    fn get_pattern_first_registry_wins() {
        let catalog = PatternCatalog::empty()
            .with_registry(fixed(&[("summarize", "first")]))
            .with_registry(fixed(&[("summarize", "second"), ("ask", "only")]));

        let first = match catalog.get_pattern("summarize") {
            Ok(p) => p,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert_eq!(first.system, "first");

        let fallback = match catalog.get_pattern("ask") {
            Ok(p) => p,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert_eq!(fallback.system, "only");
    }

    #[test]
    fn get_pattern_missing_everywhere_returns_last_error() {
        let catalog = PatternCatalog::empty()
            .with_registry(Box::new(BrokenRegistry))
            .with_registry(fixed(&[]));
        assert!(matches!(
            catalog.get_pattern("nope"),
            Err(CoreError::PatternNotFound { .. })
        ));
    }

    #[test]
    fn from_dirs_reads_base_then_extras() {
        let base = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let extra = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        for (root, name) in [(base.path(), "base_only"), (extra.path(), "extra_only")] {
            let dir = root.join(name);
            let written =
                fs::create_dir_all(&dir).and_then(|()| fs::write(dir.join(SYSTEM_PROMPT_FILE), name));
            if let Err(e) = written {
                panic!("fixture: {e}");
            }
        }

        let catalog = PatternCatalog::from_dirs(base.path(), vec![extra.path().to_path_buf()]);
        assert_eq!(catalog.len(), 2);
        let names = match catalog.list_patterns() {
            Ok(n) => n,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert_eq!(names, vec!["base_only", "extra_only"]);
    }

    #[test]
    fn extra_pattern_dirs_keeps_existing_directories_only() {
        let a = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let spec = format!(";{};/definitely/not/here; ;", a.path().display());
        let dirs = extra_pattern_dirs(&spec);
        assert_eq!(dirs, vec![a.path().to_path_buf()]);
    }

    #[test]
    fn extra_pattern_dirs_expands_environment_variables() {
        let a = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        std::env::set_var("FABRIC_TEST_EXTRA_DIR", a.path());
        let dirs = extra_pattern_dirs("$FABRIC_TEST_EXTRA_DIR;$FABRIC_TEST_UNSET_VARIABLE");
        assert_eq!(dirs, vec![a.path().to_path_buf()]);
    }

    proptest::proptest! {
        #[test]
        fn proptest_extra_pattern_dirs_never_returns_missing_paths(
            parts in proptest::collection::vec("[a-z/;~ ]{0,16}", 0..8usize),
        ) {
            let spec = parts.join(";");
            for dir in extra_pattern_dirs(&spec) {
                proptest::prop_assert!(dir.is_dir(), "{} is not a directory", dir.display());
            }
        }
    }
}
