//! Anthropic Messages API provider.
//!
//! Blocking replies go through `reqwest`; streamed replies are read as
//! server-sent events and decoded by [`crate::sse`].
//!
//! # API Reference
//! <https://docs.anthropic.com/en/api/messages>

use async_trait::async_trait;
use eventsource_client::{BoxStream, Client as _, ClientBuilder, ReconnectOptions, SSE};
use fabric_core::{ChatEntry, Pattern};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, Instrument};

use crate::client::{Client, Provider, Reply, StreamResponse};
use crate::sse::{collect_text, decode_event, forward_event, StreamEvent};
use crate::{GenerationParams, ProviderError};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Value of the `anthropic-version` header.
pub const API_VERSION: &str = "2023-06-01";

/// Models advertised by `fabric list-models`.
pub const MODELS: [&str; 5] = [
    "claude-3-5-sonnet-20240620",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
    "claude-2.1",
];

/// Capacity of the channel between the SSE consumer and the caller.
const STREAM_BUFFER: usize = 8;

/// Anthropic as a [`Provider`].
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl AnthropicProvider {
    /// Provider authenticating with `api_key` against the public API.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_owned(),
            http: reqwest::Client::new(),
        }
    }

    /// Provider configured from [`API_KEY_ENV`] and [`BASE_URL_ENV`].
    ///
    /// A missing key is reported when a client is requested, so listing
    /// models works without credentials.
    #[must_use]
    pub fn from_env() -> Self {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        let base_url = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        Self { api_key, base_url, http: reqwest::Client::new() }
    }

    /// Point the provider at a different API host (e.g. a proxy).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        MODELS.iter().map(|m| (*m).to_owned()).collect()
    }

    fn supports(&self, model: &str) -> bool {
        MODELS.contains(&model) || model.starts_with("claude-")
    }

    fn client(&self, params: &GenerationParams) -> Result<Box<dyn Client>, ProviderError> {
        if !self.supports(&params.model) {
            return Err(ProviderError::UnknownModel(params.model.clone()));
        }
        let api_key = self.api_key.clone().ok_or_else(|| ProviderError::MissingApiKey {
            provider: self.name().to_owned(),
            env_var: API_KEY_ENV.to_owned(),
        })?;

        Ok(Box::new(AnthropicClient {
            http: self.http.clone(),
            api_key,
            base_url: self.base_url.clone(),
            params: params.clone(),
        }))
    }
}

/// Anthropic bound to one model.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    params: GenerationParams,
}

impl AnthropicClient {
    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Client for AnthropicClient {
    async fn send_message(
        &self,
        pattern: &Pattern,
        history: &[ChatEntry],
    ) -> Result<Reply, ProviderError> {
        let span = info_span!("send_message", pattern = %pattern.name, model = %self.params.model);
        async {
            let body = request_body(pattern, history, &self.params, false);
            info!(messages = history.len(), "sending message");

            let resp = self
                .http
                .post(self.endpoint())
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            debug!(status = status.as_u16(), headers = ?resp.headers(), "response received");

            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                let fallback = status.canonical_reason().unwrap_or(status.as_str());
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    reason: error_reason(&text, fallback),
                });
            }

            let body: Value = resp.json().await?;
            parse_reply(&body)
        }
        .instrument(span)
        .await
    }

    async fn stream_message(
        &self,
        pattern: &Pattern,
        history: &[ChatEntry],
    ) -> Result<StreamResponse, ProviderError> {
        let body = request_body(pattern, history, &self.params, true);
        info!(pattern = %pattern.name, messages = history.len(), "starting stream");

        let stream_err = |e: eventsource_client::Error| ProviderError::Stream(e.to_string());
        let client = ClientBuilder::for_url(&self.endpoint())
            .map_err(stream_err)?
            .header("x-api-key", &self.api_key)
            .map_err(stream_err)?
            .header("anthropic-version", API_VERSION)
            .map_err(stream_err)?
            .header("content-type", "application/json")
            .map_err(stream_err)?
            .method("POST".to_owned())
            .body(body.to_string())
            .reconnect(ReconnectOptions::reconnect(false).build())
            .build();

        let (tx, rx) = mpsc::channel::<Result<String, ProviderError>>(STREAM_BUFFER);
        let mut meta = json!({ "model": self.params.model, "stream": true });
        let mut events = client.stream();

        // Read up to `message_start` so its metadata is known before returning.
        loop {
            let Some(item) = next_event(&mut events).await else {
                return Ok(StreamResponse { meta, rx });
            };
            let started = matches!(item, Ok(StreamEvent::Start { .. }));
            if let Ok(StreamEvent::Start { meta: start, .. }) = &item {
                merge_meta(&mut meta, start);
            }
            if forward_event(item, &tx).await.is_break() {
                return Ok(StreamResponse { meta, rx });
            }
            if started {
                break;
            }
        }

        let span = info_span!("sse_consumer", pattern = %pattern.name);
        tokio::spawn(
            async move {
                while let Some(item) = next_event(&mut events).await {
                    if forward_event(item, &tx).await.is_break() {
                        break;
                    }
                }
                info!("finished streaming");
            }
            .instrument(span),
        );

        Ok(StreamResponse { meta, rx })
    }
}

/// Next meaningful frame, skipping connection notices and comments.
async fn next_event(
    events: &mut BoxStream<eventsource_client::Result<SSE>>,
) -> Option<Result<StreamEvent, ProviderError>> {
    while let Some(event) = events.next().await {
        match event {
            Ok(SSE::Connected(_)) => debug!("event stream connected"),
            Ok(SSE::Comment(_)) => {}
            Ok(SSE::Event(ev)) => return Some(decode_event(&ev.event_type, &ev.data)),
            Err(e) => return Some(Err(stream_error(e).await)),
        }
    }
    None
}

/// Map an SSE client error, reading the body of non-success responses so
/// the API's own message is kept.
async fn stream_error(err: eventsource_client::Error) -> ProviderError {
    match err {
        eventsource_client::Error::UnexpectedResponse(response, body) => {
            let status = response.status();
            let text = match body.body_bytes().await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    debug!(error = %e, "failed to read error body");
                    String::new()
                }
            };
            let fallback = reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("unexpected response");
            ProviderError::Api { status, reason: error_reason(&text, fallback) }
        }
        other => ProviderError::Stream(other.to_string()),
    }
}

/// Copy the `message_start` fields over the request-side metadata.
fn merge_meta(meta: &mut Value, start: &Value) {
    if let (Some(meta), Some(start)) = (meta.as_object_mut(), start.as_object()) {
        for (key, value) in start {
            meta.insert(key.clone(), value.clone());
        }
    }
}

/// Build the JSON body of a Messages API request.
///
/// `history` entries become `messages` in order; entries with an unknown
/// role are skipped.
#[must_use]
pub fn request_body(
    pattern: &Pattern,
    history: &[ChatEntry],
    params: &GenerationParams,
    stream: bool,
) -> Value {
    let messages: Vec<Value> = history
        .iter()
        .filter_map(|entry| {
            let role = entry.role()?;
            let content = entry.content()?;
            Some(json!({ "role": role, "content": content }))
        })
        .collect();

    json!({
        "stream": stream,
        "model": params.model,
        "max_tokens": params.max_tokens,
        "temperature": params.temperature,
        "system": pattern.system,
        "messages": messages,
    })
}

/// Extract the reply text and metadata from a Messages API response.
///
/// # Errors
/// Returns [`ProviderError::MalformedResponse`] if `content` is missing.
pub fn parse_reply(body: &Value) -> Result<Reply, ProviderError> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| ProviderError::MalformedResponse("response content missing".to_owned()))?;

    let meta = json!({
        "id": body["id"],
        "model": body["model"],
        "stop_reason": body["stop_reason"],
        "usage": body["usage"],
    });

    Ok(Reply { body: collect_text(content), meta })
}

/// Prefer the API's own error message over the HTTP reason phrase.
fn error_reason(body: &str, fallback: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| fallback.to_owned())
}
