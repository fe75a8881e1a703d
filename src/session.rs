use std::sync::Arc;

use openai_api::{ApiConfig, ChatCompletionsEndpoint, ResponsesEndpoint};
use serde::{Deserialize, Serialize};
use turn_provider::{CancelSignal, ToolExecutor, TurnEndpoint, TurnEntry, TurnEvent};

use crate::error::LoopError;
use crate::run::{RunOutcome, ToolLoop};

/// Wire protocol a session speaks. Chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    ChatCompletions,
    Responses,
}

/// One configured conversation: endpoint, tools, and loop policy bound together.
pub struct Session {
    tool_loop: ToolLoop,
}

impl Session {
    pub fn new(
        protocol: Protocol,
        config: ApiConfig,
        tools: Arc<dyn ToolExecutor>,
    ) -> Result<Self, LoopError> {
        let endpoint: Arc<dyn TurnEndpoint> = match protocol {
            Protocol::ChatCompletions => Arc::new(
                ChatCompletionsEndpoint::new(config).map_err(turn_provider::TurnError::from)?,
            ),
            Protocol::Responses => {
                Arc::new(ResponsesEndpoint::new(config).map_err(turn_provider::TurnError::from)?)
            }
        };
        Ok(Self {
            tool_loop: ToolLoop::new(endpoint, tools),
        })
    }

    #[must_use]
    pub fn with_max_tool_iterations(mut self, max_tool_iterations: usize) -> Self {
        self.tool_loop = self.tool_loop.with_max_tool_iterations(max_tool_iterations);
        self
    }

    pub async fn run(
        &self,
        entry: TurnEntry,
        cancellation: Option<&CancelSignal>,
        on_event: &mut (dyn FnMut(TurnEvent) + Send),
    ) -> Result<RunOutcome, LoopError> {
        self.tool_loop.run(entry, cancellation, on_event).await
    }
}
