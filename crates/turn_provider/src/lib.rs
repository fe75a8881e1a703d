//! Provider-agnostic contract for driving one conversational turn.
//!
//! This crate intentionally defines only the shared turn lifecycle and
//! host-mediated tool-calling contract types. It excludes protocol transport
//! details, wire payloads, and multi-turn orchestration concerns.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shared cancellation flag observed by endpoints mid-stream.
pub type CancelSignal = Arc<AtomicBool>;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One structured content block inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
}

/// Message body: plain text, ordered blocks, or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Empty,
}

impl MessageContent {
    /// Flattens the content into one display string.
    pub fn combined_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .map(|block| block.text.as_str())
                .collect::<Vec<_>>()
                .join(""),
            Self::Empty => String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
            Self::Empty => true,
        }
    }
}

/// Tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Result of executing one requested tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutput {
    pub id: String,
    pub output: Value,
}

/// Tool definition advertised to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Provider-neutral conversation message.
///
/// Invariants are enforced by the constructors: a tool-role message carries
/// the id of the call it answers, and an assistant message that requests
/// tool calls carries no text content for that turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Assistant message that carries tool calls and no text.
    #[must_use]
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Empty,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool-role message answering one call id.
    #[must_use]
    pub fn tool(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Protocol-specific continuation token for the next turn.
///
/// Created by an endpoint when a turn ends in tool calls, consumed by the
/// same endpoint kind on the next call. Never crosses endpoint kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnContext {
    Responses { previous_response_id: String },
    ChatCompletions { messages: Vec<Message> },
}

/// Caller-supplied input for one endpoint invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEntry {
    Initial(Vec<Message>),
    Resume {
        context: TurnContext,
        messages: Vec<Message>,
    },
    ToolCallResults {
        context: TurnContext,
        outputs: Vec<ToolCallOutput>,
    },
}

/// Normalized outcome of one endpoint invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnResult {
    pub context: Option<TurnContext>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub resume_token: Option<String>,
}

impl TurnResult {
    /// True when the turn requested nothing further from the caller.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tool_calls.is_empty() && self.context.is_none()
    }
}

/// Caller-facing event, stable across both endpoint kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    AssistantTextDelta {
        text: String,
    },
    ToolCallRequested {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolCallCompleted {
        id: String,
        name: String,
        output: Value,
    },
}

/// Error surfaced by an endpoint for the current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// Non-2xx HTTP status, with the decoded provider message.
    Status { status: u16, message: String },
    /// Failure reported inside the provider's stream or response object.
    Provider(String),
    /// Caller or endpoint broke the turn protocol contract.
    Contract(String),
    /// Transport-level failure below the HTTP status line.
    Transport(String),
    Cancelled,
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Provider(message) => write!(f, "provider error: {message}"),
            Self::Contract(message) => write!(f, "contract violation: {message}"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Cancelled => write!(f, "turn was cancelled"),
        }
    }
}

impl std::error::Error for TurnError {}

/// One protocol endpoint: turns a caller entry into a wire request and a
/// normalized turn result, streaming events through `on_event` in wire order.
#[async_trait]
pub trait TurnEndpoint: Send + Sync {
    async fn prompt(
        &self,
        entry: TurnEntry,
        cancellation: Option<&CancelSignal>,
        on_event: &mut (dyn FnMut(TurnEvent) + Send),
    ) -> Result<TurnResult, TurnError>;
}

/// Host capability that executes one named tool with JSON arguments.
///
/// Failures are returned as plain messages; the execution loop converts them
/// to a JSON error payload so the conversation can continue.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value, String>;
}
