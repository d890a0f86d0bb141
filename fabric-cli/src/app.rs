//! Command dispatch.

use std::io::{BufRead, Read, Write};

use fabric_core::{extra_pattern_dirs, PatternCatalog, SessionManager};
use fabric_provider::{AnthropicProvider, Conversation, ProviderRegistry};
use tracing::{info, info_span, Instrument};

use crate::config::{Arguments, Command, FabricPaths};
use crate::error::CliError;
use crate::{setup, update};

/// Everything a command needs: where files live, the pattern catalog,
/// the model providers and the session store.
pub struct App {
    paths: FabricPaths,
    catalog: PatternCatalog,
    providers: ProviderRegistry,
    sessions: SessionManager,
}

impl App {
    /// Build the application for `paths`, reading extra pattern
    /// directories from `args` and provider credentials from the
    /// environment.
    #[must_use]
    pub fn new(paths: FabricPaths, args: &Arguments) -> Self {
        let extras = args.extra_patterns.as_deref().map(extra_pattern_dirs).unwrap_or_default();
        let catalog = PatternCatalog::from_dirs(paths.patterns_dir(), extras);
        let providers =
            ProviderRegistry::empty().with_provider(Box::new(AnthropicProvider::from_env()));
        let sessions = SessionManager::new(paths.sessions_dir());

        Self { paths, catalog, providers, sessions }
    }

    /// Replace the provider registry.
    #[must_use]
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Execute the command selected by `args`.
    ///
    /// Commands that talk to a model read their text from `input`; all
    /// command output goes to `out`.
    ///
    /// # Errors
    /// Returns the first error raised by the command.
    pub async fn run<R: BufRead, W: Write>(
        &self,
        args: &Arguments,
        input: &mut R,
        out: &mut W,
    ) -> Result<(), CliError> {
        let command = args.command.clone().unwrap_or(Command::ListPatterns);
        match command {
            Command::ListPatterns => {
                for name in self.catalog.list_patterns()? {
                    writeln!(out, "{name}")?;
                }
            }
            Command::ListModels => {
                let default = args.params().model;
                for entry in self.providers.list_models() {
                    let marker = if entry.model == default { " (default)" } else { "" };
                    writeln!(out, "{}/{}{marker}", entry.provider, entry.model)?;
                }
            }
            Command::ListSessions => {
                for name in self.sessions.list_sessions()? {
                    writeln!(out, "{name}")?;
                }
            }
            Command::ShowPattern { pattern } => {
                let pattern = self.catalog.get_pattern(&pattern)?;
                writeln!(out, "{}", pattern.system.trim_end())?;
            }
            Command::Pipe { pattern } => self.exchange(args, &pattern, false, input, out).await?,
            Command::Stream { pattern } => self.exchange(args, &pattern, true, input, out).await?,
            Command::ClearSession { name } => {
                self.sessions.clear_session(&name)?;
                info!(session = %name, "session cleared");
            }
            Command::PruneSession { name, keep } => {
                let mut session = self.sessions.load_session(&name)?;
                let dropped = session.prune(keep)?;
                info!(session = %name, dropped = dropped.len(), kept = session.messages().len(), "session pruned");
            }
            Command::Setup { api_key } => setup::run(&self.paths, api_key, input, out)?,
            Command::Update { repo, branch } => {
                let copied = update::run(
                    &repo,
                    branch.as_deref(),
                    &self.paths.checkout_dir(),
                    &self.paths.patterns_dir(),
                )
                .await?;
                writeln!(out, "Updated {copied} pattern files in {}", self.paths.patterns_dir().display())?;
            }
        }
        Ok(())
    }

    async fn exchange<R: Read, W: Write>(
        &self,
        args: &Arguments,
        pattern: &str,
        stream: bool,
        input: &mut R,
        out: &mut W,
    ) -> Result<(), CliError> {
        let pattern = self.catalog.get_pattern(pattern)?;
        let text = read_input(input)?;
        let params = args.params();
        let client = self.providers.client_for(&params)?;
        let session = self.sessions.get_session(args.session.as_deref())?;

        let span = info_span!(
            "exchange",
            pattern = %pattern.name,
            model = %params.model,
            session = session.name().unwrap_or("-"),
            stream,
        );
        let mut conversation = Conversation::new(session, client);
        async move {
            if stream {
                conversation.stream_message(&pattern, &text, out).await?;
            } else {
                conversation.send_message(&pattern, &text, out).await?;
            }
            Ok::<(), CliError>(())
        }
        .instrument(span)
        .await
    }
}

/// Read all of `input`, rejecting blank text.
///
/// # Errors
/// Returns [`CliError::EmptyInput`] if nothing but whitespace was read.
pub fn read_input<R: Read>(input: &mut R) -> Result<String, CliError> {
    let mut text = String::new();
    input.read_to_string(&mut text)?;
    if text.trim().is_empty() {
        return Err(CliError::EmptyInput);
    }
    Ok(text)
}
