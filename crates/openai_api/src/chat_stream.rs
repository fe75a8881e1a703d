use serde_json::Value;
use turn_provider::ToolCallRequest;

use crate::payload::decode_arguments;

/// Normalized event decoded from one chat completions stream payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatStreamEvent {
    Content(String),
    ToolCalls(Vec<ToolCallRequest>),
    Stop,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    /// Explicit wire index, when the provider sent one.
    index: Option<u64>,
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Incremental processor for chat completions stream payloads.
///
/// Tool-call deltas arrive fragmented across chunks. Fragments correlate by
/// explicit index when present; otherwise by declared id against
/// previously-seen ids; otherwise an id/name fragment starts a new call;
/// otherwise the fragment appends to the most recently updated call; and as
/// a last resort to a single pending call. Fragments that match none of
/// these are dropped.
#[derive(Debug, Default)]
pub struct ChatStreamProcessor {
    pending: Vec<PendingToolCall>,
    last_updated: Option<usize>,
}

impl ChatStreamProcessor {
    /// Decode one SSE data payload and drain the events it completes.
    pub fn process(&mut self, payload: &str) -> Vec<ChatStreamEvent> {
        if payload.trim() == "[DONE]" {
            return Vec::new();
        }

        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return Vec::new();
        };
        let Some(choice) = value
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        else {
            return Vec::new();
        };

        let mut events = Vec::new();

        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(ChatStreamEvent::Content(text.to_owned()));
                }
            }

            if let Some(fragments) = delta.get("tool_calls").and_then(Value::as_array) {
                for fragment in fragments {
                    self.apply_fragment(fragment);
                }
            }
        }

        match choice.get("finish_reason").and_then(Value::as_str) {
            Some("tool_calls") => {
                let calls = self.take_calls();
                if !calls.is_empty() {
                    events.push(ChatStreamEvent::ToolCalls(calls));
                }
            }
            Some("stop") => events.push(ChatStreamEvent::Stop),
            _ => {}
        }

        events
    }

    fn apply_fragment(&mut self, fragment: &Value) {
        let index = fragment.get("index").and_then(Value::as_u64);
        let id = fragment
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());
        let function = fragment.get("function");
        let name = function
            .and_then(|function| function.get("name"))
            .and_then(Value::as_str);
        let arguments = function
            .and_then(|function| function.get("arguments"))
            .and_then(Value::as_str);

        let Some(position) = self.correlate(index, id, name) else {
            tracing::debug!("dropping uncorrelatable tool-call fragment");
            return;
        };

        let call = &mut self.pending[position];
        if call.id.is_none() {
            call.id = id.map(ToOwned::to_owned);
        }
        if let Some(name) = name {
            call.name.push_str(name);
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(arguments);
        }
        self.last_updated = Some(position);
    }

    fn correlate(&mut self, index: Option<u64>, id: Option<&str>, name: Option<&str>) -> Option<usize> {
        if let Some(index) = index {
            if let Some(position) = self.pending.iter().position(|call| call.index == Some(index)) {
                return Some(position);
            }
            self.pending.push(PendingToolCall {
                index: Some(index),
                ..PendingToolCall::default()
            });
            return Some(self.pending.len() - 1);
        }

        if let Some(id) = id {
            if let Some(position) = self.pending.iter().position(|call| call.id.as_deref() == Some(id)) {
                return Some(position);
            }
        }

        if id.is_some() || name.is_some() {
            self.pending.push(PendingToolCall::default());
            return Some(self.pending.len() - 1);
        }

        if let Some(position) = self.last_updated {
            if position < self.pending.len() {
                return Some(position);
            }
        }

        if self.pending.len() == 1 {
            return Some(0);
        }

        None
    }

    /// Drain pending calls in arrival order, parsing buffered argument text.
    ///
    /// Malformed argument text degrades to a raw-string value; a completed
    /// call is always surfaced.
    fn take_calls(&mut self) -> Vec<ToolCallRequest> {
        self.last_updated = None;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|call| ToolCallRequest {
                id: call.id.unwrap_or_default(),
                name: call.name,
                arguments: decode_arguments(&call.arguments),
            })
            .collect()
    }
}
