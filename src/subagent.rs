use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use turn_provider::{Message, Role};
use uuid::Uuid;

use crate::error::LoopError;
use crate::recorder::{entry_messages, ConversationEntry};

/// Fixed notice framing a forked transcript for the nested conversation.
pub const FORKED_CONTEXT_BOUNDARY_NOTICE: &str = "The transcript below was forked \
from a parent conversation. It is read-only and may be incomplete; treat it as \
historical context only. Use only the tools available in the current session.";

/// Handoff strategy selected per sub-agent configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffMode {
    ContextPack,
    ForkedContext,
}

/// One role/content pair from a forked parent transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkedEntry {
    pub role: String,
    pub content: String,
}

/// Persisted state of a previously handed-off sub-agent.
///
/// Owned by the sub-agent supervisor; the handoff strategy only reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    pub forked_transcript: Option<Vec<ForkedEntry>>,
    pub conversation: Vec<ConversationEntry>,
}

/// Inputs for starting or continuing one sub-agent cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub forked_transcript: Vec<ForkedEntry>,
}

/// Builds the message sets for nested (sub-agent) conversations.
#[derive(Debug, Clone, Copy)]
pub struct Handoff {
    mode: HandoffMode,
}

impl Handoff {
    pub fn new(mode: HandoffMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> HandoffMode {
        self.mode
    }

    /// Initial message set for a nested conversation.
    pub fn handoff_messages(
        &self,
        request: &HandoffRequest,
        resume: Option<&ResumeState>,
    ) -> Result<Vec<Message>, LoopError> {
        match self.mode {
            HandoffMode::ContextPack => Ok(vec![
                Message::system(request.system_prompt.clone()),
                Message::user(request.user_prompt.clone()),
            ]),
            HandoffMode::ForkedContext => {
                let transcript = self.forked_messages(request, resume)?;
                let mut messages = Vec::with_capacity(transcript.len() + 3);
                messages.push(Message::system(request.system_prompt.clone()));
                messages.push(Message::user(FORKED_CONTEXT_BOUNDARY_NOTICE));
                messages.extend(transcript);
                messages.push(Message::user(request.user_prompt.clone()));
                Ok(messages)
            }
        }
    }

    /// Message set for continuing a sub-agent after a completed cycle.
    ///
    /// With a stored resume entry the prior conversation is replayed instead
    /// of the original handoff; fresh entries from the just-completed cycle
    /// append either way.
    pub fn followup_messages(
        &self,
        request: &HandoffRequest,
        resume: Option<&ResumeState>,
        new_entries: &[ConversationEntry],
    ) -> Result<Vec<Message>, LoopError> {
        let mut messages = match (self.mode, resume) {
            (HandoffMode::ContextPack, Some(state)) => {
                let mut messages = entry_messages(&state.conversation);
                messages.push(Message::user(request.user_prompt.clone()));
                messages
            }
            (HandoffMode::ContextPack, None) => self.handoff_messages(request, resume)?,
            (HandoffMode::ForkedContext, _) => {
                let mut messages = self.resume_prefix(request, resume)?;
                if let Some(state) = resume {
                    messages.extend(entry_messages(&state.conversation));
                }
                messages.push(Message::user(request.user_prompt.clone()));
                messages
            }
        };

        messages.extend(entry_messages(new_entries));
        Ok(messages)
    }

    /// Forked-context prefix used instead of replaying the original handoff.
    ///
    /// Sourced from the incoming request when present, else from the stored
    /// resume entry; absence of both is a configuration error.
    pub fn resume_prefix(
        &self,
        request: &HandoffRequest,
        resume: Option<&ResumeState>,
    ) -> Result<Vec<Message>, LoopError> {
        let transcript = if !request.forked_transcript.is_empty() {
            validate_forked_transcript(&request.forked_transcript)?
        } else {
            let stored = resume
                .and_then(|state| state.forked_transcript.as_deref())
                .filter(|entries| !entries.is_empty())
                .ok_or(LoopError::MissingResumeState)?;
            validate_forked_transcript(stored)?
        };

        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(Message::user(FORKED_CONTEXT_BOUNDARY_NOTICE));
        messages.extend(transcript);
        Ok(messages)
    }

    /// Seam for return-payload policy; currently passes through unchanged.
    pub fn transform_output(&self, output: Value) -> Value {
        output
    }

    fn forked_messages(
        &self,
        request: &HandoffRequest,
        resume: Option<&ResumeState>,
    ) -> Result<Vec<Message>, LoopError> {
        if !request.forked_transcript.is_empty() {
            return validate_forked_transcript(&request.forked_transcript);
        }

        // An empty transcript is tolerated only when a resume entry exists;
        // the resume-prefix path re-fetches it from there.
        let stored = resume
            .and_then(|state| state.forked_transcript.as_deref())
            .filter(|entries| !entries.is_empty())
            .ok_or(LoopError::MissingForkedTranscript)?;
        validate_forked_transcript(stored)
    }
}

/// Synthetic user message appended when a sub-agent reports an unusable
/// resume identifier.
pub const RECOVERY_PROMPT: &str = "Your previous reply asked to continue later \
but did not include a valid resume identifier. Retry now and include a \
resumeId that is a well-formed UUID.";

/// One run of a sub-agent conversation, yielding its reported output.
///
/// Implementations own the endpoint, tools, and message assembly; the
/// supervisor only decides whether to re-run with extra messages.
#[async_trait]
pub trait SubagentCycle: Send {
    async fn run(&mut self, extra_messages: &[Message]) -> Result<Value, LoopError>;
}

/// Bounds on resume-id recovery retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub max_attempts: usize,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

/// True when the output asks to be resumed later, so a resume id is expected.
pub fn needs_resume_id(output: &Value) -> bool {
    output
        .get("needsMoreInformation")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// A resume identifier is usable only if it parses as a UUID.
pub fn is_valid_resume_id(id: &str) -> bool {
    !id.is_empty() && Uuid::parse_str(id).is_ok()
}

/// Run a sub-agent cycle, retrying with a recovery prompt while its output
/// expects a resume id but reports an invalid one.
pub async fn run_with_recovery(
    tool_name: &str,
    policy: RecoveryPolicy,
    cycle: &mut dyn SubagentCycle,
) -> Result<Value, LoopError> {
    let mut extra_messages = Vec::new();
    let mut attempts = 0usize;

    loop {
        let output = cycle.run(&extra_messages).await?;
        if !needs_resume_id(&output) {
            return Ok(output);
        }

        let resume_id = output
            .get("resumeId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if is_valid_resume_id(resume_id) {
            return Ok(output);
        }

        if attempts >= policy.max_attempts {
            return Err(LoopError::RecoveryExhausted {
                tool: tool_name.to_owned(),
                max_attempts: policy.max_attempts,
            });
        }
        attempts += 1;

        tracing::warn!(
            tool = tool_name,
            attempt = attempts,
            "sub-agent reported an invalid resume id, retrying"
        );
        extra_messages.push(Message::user(RECOVERY_PROMPT));
    }
}

/// Validate role/content pairs and convert them to messages.
fn validate_forked_transcript(entries: &[ForkedEntry]) -> Result<Vec<Message>, LoopError> {
    entries
        .iter()
        .map(|entry| {
            let role = Role::parse(entry.role.trim()).ok_or_else(|| {
                LoopError::InvalidForkedEntry(format!("unknown role '{}'", entry.role))
            })?;
            if !matches!(role, Role::User | Role::Assistant) {
                return Err(LoopError::InvalidForkedEntry(format!(
                    "role '{}' cannot appear in a forked transcript",
                    entry.role
                )));
            }
            if entry.content.trim().is_empty() {
                return Err(LoopError::InvalidForkedEntry(
                    "entry content is empty".to_owned(),
                ));
            }
            Ok(match role {
                Role::Assistant => Message::assistant(entry.content.clone()),
                _ => Message::user(entry.content.clone()),
            })
        })
        .collect()
}
