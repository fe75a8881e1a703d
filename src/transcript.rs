use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use turn_provider::TurnEvent;

use crate::recorder::lock_unpoisoned;

/// Tool output as persisted: the value itself or a redaction tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutputRecord {
    Value(Value),
    Redacted,
}

/// One persisted transcript entry. Append-only, finalized once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    AssistantText {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
        output: ToolOutputRecord,
    },
}

#[derive(Debug, Default)]
struct TranscriptState {
    pending_text: String,
    entries: Vec<TranscriptEntry>,
}

/// Single-writer transcript accumulator with optional tool-output redaction.
#[derive(Debug)]
pub struct TranscriptRecorder {
    state: Mutex<TranscriptState>,
    redact_tool_outputs: bool,
}

impl TranscriptRecorder {
    pub fn new(redact_tool_outputs: bool) -> Self {
        Self {
            state: Mutex::new(TranscriptState::default()),
            redact_tool_outputs,
        }
    }

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
                state.entries.push(TranscriptEntry::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                    output: ToolOutputRecord::Redacted,
                });
            }
            TurnEvent::ToolCallCompleted { id, output, .. } => {
                if self.redact_tool_outputs {
                    return;
                }
                // Fill the most recent matching call still holding the tombstone.
                let recorded = state.entries.iter_mut().rev().find(|entry| {
                    matches!(
                        entry,
                        TranscriptEntry::ToolCall { id: call_id, output: ToolOutputRecord::Redacted, .. }
                            if call_id == id
                    )
                });
                if let Some(TranscriptEntry::ToolCall {
                    output: recorded_output,
                    ..
                }) = recorded
                {
                    *recorded_output = ToolOutputRecord::Value(output.clone());
                }
            }
        }
    }

    /// Flush accumulated text into one transcript entry for the turn.
    pub fn end_turn(&self) {
        let mut state = lock_unpoisoned(&self.state);
        flush_pending_text(&mut state);
    }

    /// Finalize the transcript; the recorder is consumed.
    pub fn finish(self) -> Vec<TranscriptEntry> {
        let mut state = lock_unpoisoned(&self.state);
        flush_pending_text(&mut state);
        std::mem::take(&mut state.entries)
    }
}

fn flush_pending_text(state: &mut TranscriptState) {
    if state.pending_text.is_empty() {
        return;
    }
    let text = std::mem::take(&mut state.pending_text);
    state.entries.push(TranscriptEntry::AssistantText { text });
}
