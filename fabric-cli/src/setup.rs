//! `fabric setup`: create the config layout and store the API key.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, Write};
use std::path::Path;

use fabric_provider::anthropic::API_KEY_ENV;
use tracing::info;

use crate::config::FabricPaths;
use crate::error::CliError;

/// Create the config directories and write `api_key` into `.env`.
///
/// When `api_key` is `None` the key is read as one line from `input`.
/// Other lines of an existing `.env` are preserved.
///
/// # Errors
/// Returns [`CliError::Config`] if no usable key is given and
/// [`CliError::Io`] if the files cannot be written.
pub fn run<R: BufRead, W: Write>(
    paths: &FabricPaths,
    api_key: Option<String>,
    input: &mut R,
    out: &mut W,
) -> Result<(), CliError> {
    let api_key = match api_key {
        Some(key) => key,
        None => {
            write!(out, "Anthropic API key: ")?;
            out.flush()?;
            let mut line = String::new();
            input.read_line(&mut line)?;
            line
        }
    };
    let api_key = api_key.trim();
    if api_key.is_empty() || api_key.contains(['\n', '\r']) {
        return Err(CliError::Config("an API key is required".to_owned()));
    }

    fs::create_dir_all(paths.patterns_dir())?;
    fs::create_dir_all(paths.sessions_dir())?;

    let env_file = paths.env_file();
    let existing = match fs::read_to_string(&env_file) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    write_private(&env_file, &upsert_env_line(&existing, API_KEY_ENV, api_key))?;

    info!(path = %env_file.display(), "wrote API key");
    writeln!(out, "Configuration saved to {}", paths.root().display())?;
    writeln!(out, "Run `fabric update` to download the standard patterns.")?;
    Ok(())
}

/// Replace `key=...` in dotenv text, or append it if absent.
#[must_use]
pub fn upsert_env_line(contents: &str, key: &str, value: &str) -> String {
    let entry = format!("{key}={value}");
    let mut replaced = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            let name = line.trim_start().trim_start_matches("export ").split('=').next();
            if name.map(str::trim) == Some(key) && line.contains('=') {
                replaced = true;
                entry.clone()
            } else {
                line.to_owned()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Write `contents` to a file only the owner can read.
///
/// New files are created with mode 0600; an existing file is narrowed to
/// 0600 before the key is written into it.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let file = options.open(path)?;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        write_all(file, contents)
    }
    #[cfg(not(unix))]
    {
        write_all(options.open(path)?, contents)
    }
}

fn write_all(mut file: fs::File, contents: &str) -> std::io::Result<()> {
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_appends_to_empty_file() {
        assert_eq!(upsert_env_line("", "ANTHROPIC_API_KEY", "sk-1"), "ANTHROPIC_API_KEY=sk-1\n");
    }

    #[test]
    fn upsert_replaces_existing_key_and_keeps_others() {
        let before = "# fabric\nFABRIC_MODEL=claude-2.1\nANTHROPIC_API_KEY=old\n";
        let after = upsert_env_line(before, "ANTHROPIC_API_KEY", "new");
        assert_eq!(after, "# fabric\nFABRIC_MODEL=claude-2.1\nANTHROPIC_API_KEY=new\n");
    }

    #[test]
    fn upsert_does_not_match_key_prefixes() {
        let before = "ANTHROPIC_API_KEY_OLD=x\n";
        let after = upsert_env_line(before, "ANTHROPIC_API_KEY", "y");
        assert_eq!(after, "ANTHROPIC_API_KEY_OLD=x\nANTHROPIC_API_KEY=y\n");
    }

    #[test]
    fn run_creates_layout_and_writes_key() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let paths = FabricPaths::new(dir.path().join("fabric"));
        let mut out = Vec::new();

        if let Err(e) = run(&paths, Some("sk-test".to_owned()), &mut &b""[..], &mut out) {
            panic!("setup failed: {e}");
        }

        assert!(paths.patterns_dir().is_dir());
        assert!(paths.sessions_dir().is_dir());
        let env = match fs::read_to_string(paths.env_file()) {
            Ok(t) => t,
            Err(e) => panic!("read .env: {e}"),
        };
        assert_eq!(env, "ANTHROPIC_API_KEY=sk-test\n");
    }

    #[test]
    fn run_prompts_when_key_missing() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let paths = FabricPaths::new(dir.path());
        let mut out = Vec::new();

        if let Err(e) = run(&paths, None, &mut &b"sk-typed\n"[..], &mut out) {
            panic!("setup failed: {e}");
        }

        assert!(String::from_utf8_lossy(&out).starts_with("Anthropic API key: "));
        let env = fs::read_to_string(paths.env_file()).unwrap_or_default();
        assert_eq!(env, "ANTHROPIC_API_KEY=sk-typed\n");
    }

    #[test]
    fn run_rejects_blank_key() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let paths = FabricPaths::new(dir.path());
        let result = run(&paths, None, &mut &b"   \n"[..], &mut Vec::new());
        assert!(matches!(result, Err(CliError::Config(_))), "got {result:?}");
        assert!(!paths.env_file().exists());
    }

    #[cfg(unix)]
    #[test]
    fn env_file_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let paths = FabricPaths::new(dir.path());
        if let Err(e) = fs::write(paths.env_file(), "FABRIC_MODEL=claude-2.1\n") {
            panic!("seed .env: {e}");
        }
        if let Err(e) = fs::set_permissions(paths.env_file(), fs::Permissions::from_mode(0o644)) {
            panic!("chmod: {e}");
        }

        for key in ["sk-first", "sk-second"] {
            if let Err(e) = run(&paths, Some(key.to_owned()), &mut &b""[..], &mut Vec::new()) {
                panic!("setup failed: {e}");
            }
            let mode = match fs::metadata(paths.env_file()) {
                Ok(m) => m.permissions().mode(),
                Err(e) => panic!("stat .env: {e}"),
            };
            assert_eq!(mode & 0o777, 0o600, "mode {mode:o} after writing {key}");
        }
        assert_eq!(
            fs::read_to_string(paths.env_file()).unwrap_or_default(),
            "FABRIC_MODEL=claude-2.1\nANTHROPIC_API_KEY=sk-second\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn new_env_file_is_created_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        };
        let path = dir.path().join(".env");
        if let Err(e) = write_private(&path, "ANTHROPIC_API_KEY=sk\n") {
            panic!("write: {e}");
        }
        let mode = fs::metadata(&path).map(|m| m.permissions().mode()).unwrap_or_default();
        assert_eq!(mode & 0o777, 0o600);
    }
}
