//! Decoding of Anthropic Messages API server-sent events.
//!
//! The wire format is documented at
//! <https://docs.anthropic.com/en/api/messages-streaming>. Each SSE frame
//! carries an event name and a JSON `data` payload; only text deltas are
//! surfaced to callers, everything else is metadata or keep-alive.

use std::ops::ControlFlow;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ProviderError;

/// Meaning of a single SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// `message_start`: message metadata and any text already present.
    Start { meta: Value, text: String },
    /// A fragment of reply text.
    Text(String),
    /// `message_delta`: stop reason and usage updates.
    Delta(Value),
    /// `message_stop`: the reply is complete.
    Done,
    /// Keep-alive or structural frame with nothing to forward.
    Ignored,
    /// An event name this client does not know.
    Unknown(String),
}

/// Separator emitted when a content block closes.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Decode one SSE frame.
///
/// # Errors
/// Returns [`ProviderError::Json`] if the payload of a known event is not
/// JSON, and [`ProviderError::Stream`] for `error` events.
pub fn decode_event(event: &str, data: &str) -> Result<StreamEvent, ProviderError> {
    match event {
        "message_start" => {
            let payload: Value = serde_json::from_str(data)?;
            let message = &payload["message"];
            let text = message["content"]
                .as_array()
                .map(|blocks| collect_text(blocks))
                .unwrap_or_default();
            let meta = serde_json::json!({
                "id": message["id"],
                "model": message["model"],
                "usage": message["usage"],
            });
            Ok(StreamEvent::Start { meta, text })
        }
        "content_block_delta" => {
            let payload: Value = serde_json::from_str(data)?;
            Ok(payload["delta"]["text"]
                .as_str()
                .map_or(StreamEvent::Ignored, |t| StreamEvent::Text(t.to_owned())))
        }
        "content_block_stop" => Ok(StreamEvent::Text(BLOCK_SEPARATOR.to_owned())),
        "message_delta" => {
            let payload: Value = serde_json::from_str(data)?;
            Ok(StreamEvent::Delta(serde_json::json!({
                "stop_reason": payload["delta"]["stop_reason"],
                "usage": payload["usage"],
            })))
        }
        "message_stop" => Ok(StreamEvent::Done),
        "content_block_start" | "ping" => Ok(StreamEvent::Ignored),
        "error" => {
            let message = serde_json::from_str::<Value>(data)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
                .unwrap_or_else(|| data.to_owned());
            Err(ProviderError::Stream(message))
        }
        other => Ok(StreamEvent::Unknown(other.to_owned())),
    }
}

/// Concatenate the text of every `text` block, logging other block types.
pub(crate) fn collect_text(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter(|block| {
            let is_text = block["type"] == "text";
            if !is_text {
                warn!(block_type = %block["type"], "skipping non-text content block");
            }
            is_text
        })
        .filter_map(|block| block["text"].as_str())
        .collect()
}

/// Push a decoded frame to the reply channel.
///
/// Breaks when the reply is complete, after an error has been forwarded, or
/// when the receiver has gone away.
pub(crate) async fn forward_event(
    item: Result<StreamEvent, ProviderError>,
    tx: &mpsc::Sender<Result<String, ProviderError>>,
) -> ControlFlow<()> {
    let fragment = match item {
        Ok(StreamEvent::Start { meta, text }) => {
            debug!(%meta, "message started");
            if text.is_empty() {
                return ControlFlow::Continue(());
            }
            Ok(text)
        }
        Ok(StreamEvent::Text(text)) => Ok(text),
        Ok(StreamEvent::Delta(meta)) => {
            debug!(%meta, "message delta");
            return ControlFlow::Continue(());
        }
        Ok(StreamEvent::Done) => return ControlFlow::Break(()),
        Ok(StreamEvent::Ignored) => return ControlFlow::Continue(()),
        Ok(StreamEvent::Unknown(name)) => {
            warn!(event = %name, "unhandled stream event");
            return ControlFlow::Continue(());
        }
        Err(e) => Err(e),
    };

    let is_err = fragment.is_err();
    if tx.send(fragment).await.is_err() {
        debug!("reply receiver dropped");
        return ControlFlow::Break(());
    }
    if is_err {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}
