//! Chat sessions persisted as YAML logs.
//!
//! A stored session is a single YAML sequence of [`ChatEntry`] values.
//! New entries are appended as one-element sequences, which keeps the file
//! a valid sequence without rewriting it on every turn.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::CoreError;
use crate::name::validate_name;

/// File extension used for stored sessions.
pub const SESSION_EXTENSION: &str = "yml";

/// One turn in a conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "role")]
pub enum ChatEntry {
    /// Text sent by the user, optionally through a pattern.
    #[serde(rename = "user", alias = "query")]
    Query {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,

        content: String,
    },

    /// Text produced by the model.
    #[serde(rename = "assistant", alias = "reply")]
    Reply { content: String },

    /// Any role this version does not understand. Kept so that newer logs
    /// still load; never sent to a provider.
    #[serde(other)]
    Unknown,
}

impl ChatEntry {
    /// A user query sent through `pattern`, if any.
    pub fn query<T: Into<String>, P: Into<String>>(content: T, pattern: Option<P>) -> Self {
        Self::Query { pattern: pattern.map(Into::into), content: content.into() }
    }

    /// A user query without a pattern.
    pub fn user<T: Into<String>>(content: T) -> Self {
        Self::query(content, None::<String>)
    }

    /// A model reply.
    pub fn assistant<T: Into<String>>(content: T) -> Self {
        Self::Reply { content: content.into() }
    }

    /// Wire role of this entry, `None` for [`ChatEntry::Unknown`].
    #[must_use]
    pub fn role(&self) -> Option<&'static str> {
        match self {
            Self::Query { .. } => Some("user"),
            Self::Reply { .. } => Some("assistant"),
            Self::Unknown => None,
        }
    }

    /// Text of this entry, `None` for [`ChatEntry::Unknown`].
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Query { content, .. } | Self::Reply { content } => Some(content),
            Self::Unknown => None,
        }
    }
}

/// A conversation history, either backed by a file or held in memory.
#[derive(Debug)]
pub enum ChatSession {
    /// Persisted under the session store.
    Stored {
        name: String,
        path: PathBuf,
        messages: Vec<ChatEntry>,
    },
    /// Lives only for the current invocation.
    Ephemeral { messages: Vec<ChatEntry> },
}

impl ChatSession {
    /// An empty in-memory session.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self::Ephemeral { messages: Vec::new() }
    }

    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral { .. })
    }

    /// Session name, `None` when ephemeral.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Stored { name, .. } => Some(name),
            Self::Ephemeral { .. } => None,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatEntry] {
        match self {
            Self::Stored { messages, .. } | Self::Ephemeral { messages } => messages,
        }
    }

    fn messages_mut(&mut self) -> &mut Vec<ChatEntry> {
        match self {
            Self::Stored { messages, .. } | Self::Ephemeral { messages } => messages,
        }
    }

    /// Record `entry`, writing it to disk first for stored sessions.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] or [`CoreError::Encode`] if the entry could
    /// not be persisted; the in-memory history is left untouched in that case.
    pub fn append(&mut self, entry: ChatEntry) -> Result<(), CoreError> {
        if let Self::Stored { path, .. } = self {
            let file = OpenOptions::new().create(true).append(true).open(&*path)?;
            let mut writer = BufWriter::new(file);
            serde_yaml::to_writer(&mut writer, &[&entry])?;
            writer.flush()?;
        }

        self.messages_mut().push(entry);
        Ok(())
    }

    /// Keep only the last `keep` entries and return the discarded ones.
    ///
    /// Stored sessions are rewritten in full.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] or [`CoreError::Encode`] if the rewrite fails.
    pub fn prune(&mut self, keep: usize) -> Result<Vec<ChatEntry>, CoreError> {
        let messages = self.messages_mut();
        let start = messages.len().saturating_sub(keep);
        let discarded: Vec<ChatEntry> = messages.drain(..start).collect();
        debug!(discarded = discarded.len(), kept = messages.len(), "pruned session");

        if let Self::Stored { path, messages, .. } = self {
            write_log(path, messages)?;
        }

        Ok(discarded)
    }

    /// Forget every entry and delete the backing file, if any.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] if the file exists but cannot be removed.
    pub fn clear(&mut self) -> Result<(), CoreError> {
        if let Self::Stored { path, .. } = self {
            remove_if_exists(path)?;
        }
        self.messages_mut().clear();
        Ok(())
    }
}

/// Creates, loads and deletes stored sessions under one directory.
#[derive(Debug, Clone)]
pub struct SessionManager {
    store: PathBuf,
}

impl SessionManager {
    pub fn new(store: impl Into<PathBuf>) -> Self {
        Self { store: store.into() }
    }

    /// Directory holding the session files.
    #[must_use]
    pub fn store(&self) -> &Path {
        &self.store
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, CoreError> {
        let name = validate_name(name)?;
        Ok(self.store.join(format!("{name}.{SESSION_EXTENSION}")))
    }

    /// Names of all stored sessions, sorted. A missing store is empty.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] if the store exists but cannot be read.
    #[instrument(skip(self), fields(store = %self.store.display()))]
    pub fn list_sessions(&self) -> Result<Vec<String>, CoreError> {
        let entries = match fs::read_dir(&self.store) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::Io(e)),
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|x| x == SESSION_EXTENSION))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_owned))
            .collect();
        names.sort();

        Ok(names)
    }

    /// The named session, or an ephemeral one when `name` is `None`.
    ///
    /// # Errors
    /// See [`SessionManager::load_or_create`].
    pub fn get_session(&self, name: Option<&str>) -> Result<ChatSession, CoreError> {
        match name {
            Some(name) => self.load_or_create(name),
            None => Ok(ChatSession::ephemeral()),
        }
    }

    /// Load the named session, creating an empty one if it does not exist.
    ///
    /// # Errors
    /// Returns [`CoreError::SessionFormat`] if an existing file is corrupt;
    /// it is never overwritten.
    #[instrument(skip(self))]
    pub fn load_or_create(&self, name: &str) -> Result<ChatSession, CoreError> {
        let path = self.path_for(name)?;
        if path.exists() {
            return self.load_session(name);
        }

        info!(path = %path.display(), "creating new session");
        fs::create_dir_all(&self.store)?;
        File::create(&path)?;

        Ok(ChatSession::Stored { name: name.to_owned(), path, messages: Vec::new() })
    }

    /// Load an existing session.
    ///
    /// # Errors
    /// Returns [`CoreError::Io`] if the file is missing or unreadable and
    /// [`CoreError::SessionFormat`] if it does not decode.
    #[instrument(skip(self))]
    pub fn load_session(&self, name: &str) -> Result<ChatSession, CoreError> {
        let path = self.path_for(name)?;
        let text = fs::read_to_string(&path)?;
        let messages = parse_log(&text)
            .map_err(|source| CoreError::SessionFormat { path: path.clone(), source })?;

        debug!(entries = messages.len(), "loaded session");
        Ok(ChatSession::Stored { name: name.to_owned(), path, messages })
    }

    /// Delete a stored session. Deleting a missing session is not an error.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidName`] or [`CoreError::Io`].
    pub fn clear_session(&self, name: &str) -> Result<(), CoreError> {
        let path = self.path_for(name)?;
        remove_if_exists(&path)
    }
}

/// Decode a session log. Blank input is an empty log.
///
/// # Errors
/// Returns the YAML error if `text` is not a sequence of entries.
pub fn parse_log(text: &str) -> Result<Vec<ChatEntry>, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(text)
}

fn write_log(path: &Path, messages: &[ChatEntry]) -> Result<(), CoreError> {
    let known: Vec<&ChatEntry> = messages.iter().filter(|m| m.role().is_some()).collect();
    let mut writer = BufWriter::new(File::create(path)?);
    // An empty sequence would serialize as `[]`, which later appends cannot extend.
    if !known.is_empty() {
        serde_yaml::to_writer(&mut writer, &known)?;
    }
    writer.flush()?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), CoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::Io(e)),
    }
}
