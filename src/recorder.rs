use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use turn_provider::{Message, ToolCallOutput, ToolCallRequest, TurnEvent};

/// Rich, non-redacted record used to continue a dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationEntry {
    Message(Message),
    ToolCall(ToolCallRequest),
    ToolOutput(ToolCallOutput),
}

/// Messages replaying a slice of conversation entries.
pub fn entry_messages(entries: &[ConversationEntry]) -> Vec<Message> {
    entries
        .iter()
        .map(|entry| match entry {
            ConversationEntry::Message(message) => message.clone(),
            ConversationEntry::ToolCall(call) => Message::assistant_tool_calls(vec![call.clone()]),
            ConversationEntry::ToolOutput(output) => Message::tool(
                output.id.clone(),
                match &output.output {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
            ),
        })
        .collect()
}

#[derive(Debug, Default)]
struct RecorderState {
    pending_text: String,
    entries: Vec<ConversationEntry>,
}

/// Single-writer conversation accumulator.
///
/// Updated from the event callback and read once at `finish()`; the mutex
/// keeps the two from interleaving. Text deltas coalesce into one assistant
/// message per turn, flushed by `end_turn()`.
#[derive(Debug, Default)]
pub struct ConversationRecorder {
    state: Mutex<RecorderState>,
}

impl ConversationRecorder {
    pub fn on_event(&self, event: &TurnEvent) {
        let mut state = lock_unpoisoned(&self.state);
        match event {
            TurnEvent::AssistantTextDelta { text } => state.pending_text.push_str(text),
            TurnEvent::ToolCallRequested {
                id,
                name,
                arguments,
            } => {
                flush_pending_text(&mut state);
                state.entries.push(ConversationEntry::ToolCall(ToolCallRequest {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }));
            }
            TurnEvent::ToolCallCompleted { id, output, .. } => {
                state.entries.push(ConversationEntry::ToolOutput(ToolCallOutput {
                    id: id.clone(),
                    output: output.clone(),
                }));
            }
        }
    }

    /// Flush accumulated text into one assistant message for the turn.
    pub fn end_turn(&self) {
        let mut state = lock_unpoisoned(&self.state);
        flush_pending_text(&mut state);
    }

    /// Final flush; the recorder is consumed and its state handed back.
    pub fn finish(self) -> Vec<ConversationEntry> {
        let mut state = lock_unpoisoned(&self.state);
        flush_pending_text(&mut state);
        std::mem::take(&mut state.entries)
    }
}

fn flush_pending_text(state: &mut RecorderState) {
    if state.pending_text.is_empty() {
        return;
    }
    let text = std::mem::take(&mut state.pending_text);
    state
        .entries
        .push(ConversationEntry::Message(Message::assistant(text)));
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
