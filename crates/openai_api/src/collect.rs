use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ApiError;
use crate::sse::SseFrame;

/// Everything the collector learned from one response stream.
#[derive(Debug, Clone, Default)]
pub struct CollectedResponse {
    /// Terminal response object embedded in the stream, if any arrived.
    pub response: Option<Value>,
    /// Accumulated text per output index.
    pub texts: BTreeMap<u64, String>,
    /// Most recent response id seen anywhere in the stream.
    pub last_response_id: Option<String>,
}

impl CollectedResponse {
    /// True when any delta text was streamed before the terminal object.
    pub fn streamed_text(&self) -> bool {
        self.texts.values().any(|text| !text.is_empty())
    }
}

/// Incremental collector for responses-protocol SSE frames.
///
/// Decoding is best-effort: a payload that fails to decode as one object is
/// split into newline-separated sub-objects decoded independently, and a
/// sub-object decode failure is silently skipped (a known provider quirk).
#[derive(Debug, Default)]
pub struct ResponsesStreamCollector {
    collected: CollectedResponse,
    failure: Option<String>,
}

impl ResponsesStreamCollector {
    /// Feed one frame; returns the text fragments to stream to the caller.
    pub fn feed(&mut self, frame: &SseFrame) -> Vec<String> {
        let mut fragments = Vec::new();

        match serde_json::from_str::<Value>(&frame.data) {
            Ok(payload) => self.absorb(&payload, &mut fragments),
            Err(_) => {
                for line in frame.data.lines() {
                    if let Ok(payload) = serde_json::from_str::<Value>(line) {
                        self.absorb(&payload, &mut fragments);
                    }
                }
            }
        }

        fragments
    }

    /// Raise any captured failure, else hand back the accumulated state.
    pub fn finish(self) -> Result<CollectedResponse, ApiError> {
        match self.failure {
            Some(message) => Err(ApiError::StreamFailed { message }),
            None => Ok(self.collected),
        }
    }

    fn absorb(&mut self, payload: &Value, fragments: &mut Vec<String>) {
        self.track_response_id(payload);

        let Some(event_type) = payload.get("type").and_then(Value::as_str) else {
            return;
        };

        match event_type {
            "response.output_text.delta" | "response.message.delta" => {
                let Some(fragment) = payload.get("delta").and_then(extract_text_fragment) else {
                    return;
                };
                if fragment.is_empty() {
                    return;
                }
                let index = payload.get("output_index").and_then(Value::as_u64).unwrap_or(0);
                self.collected
                    .texts
                    .entry(index)
                    .or_default()
                    .push_str(&fragment);
                fragments.push(fragment);
            }
            "response.completed" | "response.requires_action" => {
                if let Some(response) = payload.get("response") {
                    self.collected.response = Some(response.clone());
                }
            }
            "response.failed" | "response.cancelled" | "response.error" => {
                if let Some(response) = payload.get("response") {
                    self.collected.response = Some(response.clone());
                }
                self.failure = Some(failure_message(payload));
            }
            _ => {}
        }
    }

    fn track_response_id(&mut self, payload: &Value) {
        let id = payload
            .get("response_id")
            .and_then(Value::as_str)
            .or_else(|| {
                payload
                    .get("response")
                    .and_then(|response| response.get("id"))
                    .and_then(Value::as_str)
            });
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            self.collected.last_response_id = Some(id.to_owned());
        }
    }
}

/// Best-effort text extraction from a delta value.
///
/// A fragment may be a bare string, nested under `text`/`delta`/`content`
/// (recursively), or an array of fragments to concatenate.
fn extract_text_fragment(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(extract_text_fragment).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(""))
            }
        }
        Value::Object(fields) => ["text", "delta", "content"]
            .iter()
            .filter_map(|key| fields.get(*key))
            .find_map(extract_text_fragment),
        _ => None,
    }
}

fn failure_message(payload: &Value) -> String {
    payload
        .get("response")
        .and_then(|response| response.get("error"))
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .or_else(|| {
            payload
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
        })
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .filter(|message| !message.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| "response stream reported failure".to_owned())
}
