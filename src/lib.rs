//! Client-side orchestration for tool-calling completion APIs.
//!
//! The [`ToolLoop`] drives one conversation against a [`TurnEndpoint`]:
//! it streams turn events to the caller, executes requested tool calls in
//! order, feeds the outputs back, and stops at the first final turn or the
//! iteration cap. [`Session`] binds an endpoint implementation, a tool
//! executor, and the loop policy together from resolved configuration.
//! Sub-agent handoffs (context-pack or forked-context) live in
//! [`subagent`], along with resume-id recovery.

pub mod error;
pub mod recorder;
pub mod run;
pub mod session;
pub mod subagent;
pub mod transcript;

pub use error::LoopError;
pub use recorder::{entry_messages, ConversationEntry, ConversationRecorder};
pub use run::{RunOutcome, ToolLoop, DEFAULT_MAX_TOOL_ITERATIONS};
pub use session::{Protocol, Session};
pub use subagent::{
    is_valid_resume_id, needs_resume_id, run_with_recovery, ForkedEntry, Handoff, HandoffMode,
    HandoffRequest, RecoveryPolicy, ResumeState, SubagentCycle, FORKED_CONTEXT_BOUNDARY_NOTICE,
    RECOVERY_PROMPT,
};
pub use transcript::{ToolOutputRecord, TranscriptEntry, TranscriptRecorder};

pub use turn_provider::{
    CancelSignal, ContentBlock, Message, MessageContent, Role, ToolCallOutput, ToolCallRequest,
    ToolExecutor, ToolSpec, TurnContext, TurnEndpoint, TurnEntry, TurnError, TurnEvent, TurnResult,
};
