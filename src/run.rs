use std::sync::Arc;

use serde_json::json;
use turn_provider::{
    CancelSignal, ToolCallOutput, ToolExecutor, TurnEndpoint, TurnEntry, TurnEvent,
};

use crate::error::LoopError;
use crate::recorder::{ConversationEntry, ConversationRecorder};

/// Default cap on tool iterations within one run.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 8;

/// Everything a finished run hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub conversation: Vec<ConversationEntry>,
    pub resume_token: Option<String>,
}

/// Bounded tool-calling execution loop over one endpoint.
///
/// Tool calls execute strictly in the order returned by the model; one
/// outstanding network call at a time. Exceeding the iteration cap is a
/// reported error, never a silent truncation.
pub struct ToolLoop {
    endpoint: Arc<dyn TurnEndpoint>,
    tools: Arc<dyn ToolExecutor>,
    max_tool_iterations: usize,
}

impl ToolLoop {
    pub fn new(endpoint: Arc<dyn TurnEndpoint>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            endpoint,
            tools,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    #[must_use]
    pub fn with_max_tool_iterations(mut self, max_tool_iterations: usize) -> Self {
        self.max_tool_iterations = max_tool_iterations;
        self
    }

    pub async fn run(
        &self,
        entry: TurnEntry,
        cancellation: Option<&CancelSignal>,
        on_event: &mut (dyn FnMut(TurnEvent) + Send),
    ) -> Result<RunOutcome, LoopError> {
        let recorder = ConversationRecorder::default();
        let mut next_entry = entry;
        let mut resume_token = None;
        let mut iterations = 0usize;

        loop {
            let result = {
                let mut wrapped = |event: TurnEvent| {
                    recorder.on_event(&event);
                    on_event(event);
                };
                self.endpoint
                    .prompt(next_entry, cancellation, &mut wrapped)
                    .await?
            };
            recorder.end_turn();

            if let Some(token) = result.resume_token {
                resume_token = Some(token);
            }

            if result.tool_calls.is_empty() {
                break;
            }

            iterations += 1;
            if iterations > self.max_tool_iterations {
                return Err(LoopError::ToolIterationLimit {
                    max: self.max_tool_iterations,
                });
            }

            // Missing continuation alongside tool calls is an endpoint bug,
            // not a user-facing provider failure.
            let Some(context) = result.context else {
                return Err(LoopError::MissingContinuation);
            };

            let mut outputs = Vec::with_capacity(result.tool_calls.len());
            for call in result.tool_calls {
                let requested = TurnEvent::ToolCallRequested {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                };
                recorder.on_event(&requested);
                on_event(requested);

                tracing::debug!(tool = %call.name, id = %call.id, "executing tool call");
                let output = match self.tools.execute(&call.name, call.arguments.clone()).await {
                    Ok(value) => value,
                    // Tool failures feed back through the normal channel so
                    // the conversation can continue.
                    Err(message) => json!({ "error": message }),
                };

                let completed = TurnEvent::ToolCallCompleted {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: output.clone(),
                };
                recorder.on_event(&completed);
                on_event(completed);

                outputs.push(ToolCallOutput {
                    id: call.id,
                    output,
                });
            }

            next_entry = TurnEntry::ToolCallResults { context, outputs };
        }

        Ok(RunOutcome {
            conversation: recorder.finish(),
            resume_token,
        })
    }
}
