//! Conversation driver: one session talking to one client.
//!
//! Each exchange appends the user query to the session, asks the client
//! for a reply over the full history, writes the reply to the caller's
//! output and finally records it in the session.

use std::io::Write;

use fabric_core::{ChatEntry, ChatSession, Pattern};
use tracing::{info, warn};

use crate::client::{Client, Reply};
use crate::ProviderError;

/// A chat session bound to a client.
pub struct Conversation {
    session: ChatSession,
    client: Box<dyn Client>,
}

impl Conversation {
    #[must_use]
    pub fn new(session: ChatSession, client: Box<dyn Client>) -> Self {
        Self { session, client }
    }

    #[must_use]
    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Give the session back, e.g. to prune it.
    #[must_use]
    pub fn into_session(self) -> ChatSession {
        self.session
    }

    /// Send `text` through `pattern` and write the full reply to `out`.
    ///
    /// # Errors
    /// Returns [`ProviderError::Session`] if the session cannot be written,
    /// [`ProviderError::Io`] if `out` fails, or the client's error.
    pub async fn send_message<W: Write>(
        &mut self,
        pattern: &Pattern,
        text: &str,
        out: &mut W,
    ) -> Result<Reply, ProviderError> {
        self.session.append(ChatEntry::query(text, Some(&pattern.name)))?;

        let reply = self.client.send_message(pattern, self.session.messages()).await?;
        info!(meta = %reply.meta, "reply received");

        writeln!(out, "{}", reply.body)?;
        out.flush()?;

        self.session.append(ChatEntry::assistant(&reply.body))?;
        Ok(reply)
    }

    /// Send `text` through `pattern` and copy the reply to `out` as it
    /// arrives. Returns the complete reply text.
    ///
    /// The reply is recorded only if the stream finishes cleanly.
    ///
    /// # Errors
    /// Returns the first error reported by the stream, in addition to the
    /// errors of [`Conversation::send_message`].
    pub async fn stream_message<W: Write>(
        &mut self,
        pattern: &Pattern,
        text: &str,
        out: &mut W,
    ) -> Result<String, ProviderError> {
        self.session.append(ChatEntry::query(text, Some(&pattern.name)))?;

        let response = self.client.stream_message(pattern, self.session.messages()).await?;
        info!(meta = %response.meta, "stream opened");

        let mut rx = response.rx;
        let mut content = String::new();
        while let Some(fragment) = rx.recv().await {
            match fragment {
                Ok(fragment) => {
                    write!(out, "{fragment}")?;
                    out.flush()?;
                    content.push_str(&fragment);
                }
                Err(e) => {
                    warn!(error = %e, received = content.len(), "stream aborted; reply not saved");
                    return Err(e);
                }
            }
        }

        self.session.append(ChatEntry::assistant(&content))?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::client::StreamResponse;

    /// Replays canned fragments and remembers the history it was given.
    struct ScriptedClient {
        fragments: Vec<Result<String, String>>,
        seen: Mutex<Vec<usize>>,
    }

    impl ScriptedClient {
        fn new(fragments: Vec<Result<String, String>>) -> Self {
            Self { fragments, seen: Mutex::new(Vec::new()) }
        }

        fn record(&self, history: &[ChatEntry]) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(history.len());
            }
        }
    }

    #[async_trait]
    impl Client for ScriptedClient {
        async fn send_message(
            &self,
            _pattern: &Pattern,
            history: &[ChatEntry],
        ) -> Result<Reply, ProviderError> {
            self.record(history);
            let mut body = String::new();
            for fragment in &self.fragments {
                match fragment {
                    Ok(text) => body.push_str(text),
                    Err(e) => return Err(ProviderError::Api { status: 500, reason: e.clone() }),
                }
            }
            Ok(Reply { body, meta: Value::Null })
        }

        async fn stream_message(
            &self,
            _pattern: &Pattern,
            history: &[ChatEntry],
        ) -> Result<StreamResponse, ProviderError> {
            self.record(history);
            let (tx, rx) = mpsc::channel(self.fragments.len().max(1));
            for fragment in &self.fragments {
                let item = fragment.clone().map_err(ProviderError::Stream);
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            Ok(StreamResponse { meta: Value::Null, rx })
        }
    }

    fn pattern() -> Pattern {
        Pattern::new("summarize", "Summarize.")
    }

    fn ok(fragments: &[&str]) -> Vec<Result<String, String>> {
        fragments.iter().map(|f| Ok((*f).to_owned())).collect()
    }

    #[tokio::test]
    async fn send_message_writes_reply_and_records_both_turns() {
        let client = ScriptedClient::new(ok(&["short ", "summary"]));
        let mut convo = Conversation::new(ChatSession::ephemeral(), Box::new(client));
        let mut out = Vec::new();

        let reply = match convo.send_message(&pattern(), "long text", &mut out).await {
            Ok(r) => r,
            Err(e) => panic!("send failed: {e}"),
        };

        assert_eq!(reply.body, "short summary");
        assert_eq!(String::from_utf8_lossy(&out), "short summary\n");
        assert_eq!(
            convo.session().messages(),
            &[
                ChatEntry::query("long text", Some("summarize")),
                ChatEntry::assistant("short summary"),
            ]
        );
    }

    #[tokio::test]
    async fn send_message_error_keeps_query_only() {
        let client = ScriptedClient::new(vec![Err("overloaded".to_owned())]);
        let mut convo = Conversation::new(ChatSession::ephemeral(), Box::new(client));
        let mut out = Vec::new();

        let result = convo.send_message(&pattern(), "hello", &mut out).await;
        assert!(matches!(result, Err(ProviderError::Api { status: 500, .. })));
        assert!(out.is_empty(), "nothing should be written on failure");
        assert_eq!(convo.session().messages().len(), 1);
    }

    #[tokio::test]
    async fn stream_message_copies_fragments_in_order() {
        let client = ScriptedClient::new(ok(&["one ", "two ", "three", "\n\n"]));
        let mut convo = Conversation::new(ChatSession::ephemeral(), Box::new(client));
        let mut out = Vec::new();

        let content = match convo.stream_message(&pattern(), "count", &mut out).await {
            Ok(c) => c,
            Err(e) => panic!("stream failed: {e}"),
        };

        assert_eq!(content, "one two three\n\n");
        assert_eq!(String::from_utf8_lossy(&out), "one two three\n\n");
        assert_eq!(
            convo.session().messages().last(),
            Some(&ChatEntry::assistant("one two three\n\n"))
        );
    }

    #[tokio::test]
    async fn stream_message_error_does_not_save_partial_reply() {
        let fragments = vec![Ok("partial".to_owned()), Err("connection reset".to_owned())];
        let client = ScriptedClient::new(fragments);
        let mut convo = Conversation::new(ChatSession::ephemeral(), Box::new(client));
        let mut out = Vec::new();

        let result = convo.stream_message(&pattern(), "go", &mut out).await;
        assert!(matches!(result, Err(ProviderError::Stream(m)) if m == "connection reset"));
        assert_eq!(String::from_utf8_lossy(&out), "partial");
        assert_eq!(convo.into_session().messages(), &[ChatEntry::query("go", Some("summarize"))]);
    }

    #[tokio::test]
    async fn follow_up_messages_send_full_history() {
        let client = std::sync::Arc::new(ScriptedClient::new(ok(&["ok"])));

        struct Shared(std::sync::Arc<ScriptedClient>);

        #[async_trait]
        impl Client for Shared {
            async fn send_message(
                &self,
                pattern: &Pattern,
                history: &[ChatEntry],
            ) -> Result<Reply, ProviderError> {
                self.0.send_message(pattern, history).await
            }

            async fn stream_message(
                &self,
                pattern: &Pattern,
                history: &[ChatEntry],
            ) -> Result<StreamResponse, ProviderError> {
                self.0.stream_message(pattern, history).await
            }
        }

        let mut convo =
            Conversation::new(ChatSession::ephemeral(), Box::new(Shared(client.clone())));
        let mut out = Vec::new();
        for text in ["first", "second", "third"] {
            if let Err(e) = convo.send_message(&pattern(), text, &mut out).await {
                panic!("send failed: {e}");
            }
        }

        let seen = match client.seen.lock() {
            Ok(s) => s.clone(),
            Err(e) => panic!("lock poisoned: {e}"),
        };
        assert_eq!(seen, vec![1, 3, 5], "each request must carry the whole history");
    }
}
