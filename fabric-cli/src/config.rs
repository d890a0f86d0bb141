//! Command line arguments, directory layout and `.env` loading.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use fabric_provider::{GenerationParams, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};

use crate::error::CliError;
use crate::update::DEFAULT_PATTERNS_REPO;

/// Overrides the configuration directory when set.
pub const HOME_ENV: &str = "FABRIC_HOME";

#[derive(Parser, Debug, Clone)]
#[command(name = "fabric", version, about = "Run reusable LLM prompts over piped text")]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// The name of the LLM to use
    #[arg(short, long, global = true, env = "FABRIC_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Semicolon-separated list of directories containing more patterns
    #[arg(long, global = true, env = "EXTRA_PATTERNS")]
    pub extra_patterns: Option<String>,

    /// Chat session to continue; omit for a one-off exchange
    #[arg(short, long, global = true, env = "FABRIC_SESSION")]
    pub session: Option<String>,

    /// Maximum number of tokens to generate
    #[arg(long, global = true, env = "FABRIC_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Sampling temperature between 0 and 1
    #[arg(long, global = true, env = "FABRIC_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Log filter for stderr output (e.g. `info`, `fabric_provider=debug`)
    #[arg(long, global = true, env = "FABRIC_LOG", default_value = "warn")]
    pub log_level: String,
}

impl Arguments {
    /// Generation parameters selected on the command line.
    #[must_use]
    pub fn params(&self) -> GenerationParams {
        GenerationParams::new(&self.model)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List available patterns
    ListPatterns,

    /// Show all available models
    ListModels,

    /// List stored chat sessions
    ListSessions,

    /// Print the system prompt of a pattern
    ShowPattern { pattern: String },

    /// See results in realtime
    Stream { pattern: String },

    /// Pipe output into another command
    Pipe { pattern: String },

    /// Delete a stored chat session
    ClearSession { name: String },

    /// Drop all but the most recent entries of a chat session
    PruneSession {
        name: String,

        /// Number of entries to keep
        #[arg(long, default_value_t = 10)]
        keep: usize,
    },

    /// Initialize fabric
    Setup {
        /// Anthropic API key; prompted for when omitted
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Update patterns
    Update {
        /// Git repository containing a `patterns/` directory
        #[arg(long, default_value = DEFAULT_PATTERNS_REPO)]
        repo: String,

        /// Branch or tag to fetch instead of the default branch
        #[arg(long)]
        branch: Option<String>,
    },
}

/// Where fabric keeps its files.
///
/// ```text
/// <root>/.env
/// <root>/patterns/<name>/system.md
/// <root>/sessions/<name>.yml
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricPaths {
    root: PathBuf,
    cache: PathBuf,
}

impl FabricPaths {
    /// Layout rooted at `root`, with scratch space under `root/.cache`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let cache = root.join(".cache");
        Self { root, cache }
    }

    /// Resolve the layout from the environment.
    ///
    /// Precedence: `FABRIC_HOME` > `<platform config dir>/fabric`.
    ///
    /// # Errors
    /// Returns [`CliError::Config`] if neither is available.
    pub fn discover() -> Result<Self, CliError> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(home));
        }

        let root = dirs::config_dir()
            .map(|d| d.join("fabric"))
            .ok_or_else(|| CliError::Config(format!("cannot determine config directory; set {HOME_ENV}")))?;
        let cache = dirs::cache_dir()
            .map_or_else(|| root.join(".cache"), |d| d.join("fabric"));

        Ok(Self { root, cache })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    #[must_use]
    pub fn patterns_dir(&self) -> PathBuf {
        self.root.join("patterns")
    }

    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Scratch directory used while downloading patterns.
    #[must_use]
    pub fn checkout_dir(&self) -> PathBuf {
        self.cache.join("patterns-checkout")
    }
}

/// Load `.env` files into the process environment.
///
/// The fabric config `.env` is read first, then one in the working
/// directory. Variables that are already set are never overridden.
/// Runs before logging is set up, so a broken file is reported on stderr.
pub fn load_env_files(paths: &FabricPaths) {
    if let Err(e) = load_env_file(&paths.env_file()) {
        eprintln!("fabric: ignoring {e}");
    }
    dotenvy::dotenv().ok();
}

/// Load one `.env` file; returns `false` when there is none.
///
/// # Errors
/// Returns [`CliError::Config`] if the file exists but cannot be read or parsed.
pub fn load_env_file(path: &Path) -> Result<bool, CliError> {
    if !path.is_file() {
        return Ok(false);
    }
    dotenvy::from_path(path).map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
    Ok(true)
}
