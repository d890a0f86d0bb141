//! `fabric update`: fetch the pattern collection from git.

use std::fs;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::CliError;

/// Repository the standard patterns are published in.
pub const DEFAULT_PATTERNS_REPO: &str = "https://github.com/danielmiessler/fabric.git";

/// Directory inside the repository holding one sub-directory per pattern.
pub const PATTERNS_SUBDIR: &str = "patterns";

/// Shallow-clone `repo` into `checkout` and copy its patterns into `dest`.
///
/// Existing patterns with the same names are overwritten; others are left
/// alone. Returns the number of files copied.
///
/// # Errors
/// Returns [`CliError::Update`] if git cannot be run, the clone fails or
/// the repository has no `patterns/` directory.
#[instrument(skip(checkout, dest), fields(path = %checkout.display()))]
pub async fn run(
    repo: &str,
    branch: Option<&str>,
    checkout: &Path,
    dest: &Path,
) -> Result<usize, CliError> {
    if checkout.exists() {
        fs::remove_dir_all(checkout)?;
    }
    if let Some(parent) = checkout.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut git = Command::new("git");
    git.arg("clone").arg("--depth").arg("1");
    if let Some(branch) = branch {
        git.arg("--branch").arg(branch);
    }
    git.arg(repo).arg(checkout);

    let output = git
        .output()
        .await
        .map_err(|e| CliError::Update(format!("cannot run git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CliError::Update(format!("git clone failed ({}): {}", output.status, stderr.trim())));
    }
    debug!("clone finished");

    let result = copy_patterns(&checkout.join(PATTERNS_SUBDIR), dest);
    if let Err(e) = fs::remove_dir_all(checkout) {
        warn!(error = %e, "failed to remove checkout");
    }

    let copied = result?;
    info!(copied, dest = %dest.display(), "patterns updated");
    Ok(copied)
}

/// Recursively copy `src` into `dest`, returning the number of files copied.
///
/// # Errors
/// Returns [`CliError::Update`] if `src` is not a directory, or the walk
/// and I/O errors encountered while copying.
pub fn copy_patterns(src: &Path, dest: &Path) -> Result<usize, CliError> {
    if !src.is_dir() {
        return Err(CliError::Update(format!("{} is not a directory", src.display())));
    }

    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, text: &str) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                panic!("mkdir {}: {e}", parent.display());
            }
        }
        if let Err(e) = fs::write(path, text) {
            panic!("write {}: {e}", path.display());
        }
    }

    #[test]
    fn copy_patterns_mirrors_tree_and_counts_files() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let src = dir.path().join("repo/patterns");
        let dest = dir.path().join("home/patterns");
        write(&src.join("summarize/system.md"), "Summarize.");
        write(&src.join("summarize/README.md"), "docs");
        write(&src.join("extract_wisdom/system.md"), "Extract.");

        let copied = match copy_patterns(&src, &dest) {
            Ok(n) => n,
            Err(e) => panic!("copy failed: {e}"),
        };

        assert_eq!(copied, 3);
        assert_eq!(fs::read_to_string(dest.join("summarize/system.md")).unwrap_or_default(), "Summarize.");
        assert!(dest.join("extract_wisdom/system.md").is_file());
    }

    #[test]
    fn copy_patterns_overwrites_but_keeps_local_patterns() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        write(&src.join("summarize/system.md"), "new");
        write(&dest.join("summarize/system.md"), "old");
        write(&dest.join("mine/system.md"), "local");

        if let Err(e) = copy_patterns(&src, &dest) {
            panic!("copy failed: {e}");
        }

        assert_eq!(fs::read_to_string(dest.join("summarize/system.md")).unwrap_or_default(), "new");
        assert_eq!(fs::read_to_string(dest.join("mine/system.md")).unwrap_or_default(), "local");
    }

    #[test]
    fn copy_patterns_requires_source_dir() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let result = copy_patterns(&dir.path().join("missing"), &dir.path().join("dest"));
        assert!(matches!(result, Err(CliError::Update(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn run_reports_clone_failure() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let missing_repo = dir.path().join("no-such-repo");
        let result = run(
            &missing_repo.display().to_string(),
            None,
            &dir.path().join("checkout"),
            &dir.path().join("patterns"),
        )
        .await;

        assert!(matches!(result, Err(CliError::Update(_))), "got {result:?}");
        assert!(!dir.path().join("patterns").exists());
    }
}
