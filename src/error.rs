use std::fmt;

use turn_provider::TurnError;

/// Error surfaced by the execution loop and the sub-agent supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// Endpoint-level failure for the current turn.
    Turn(TurnError),
    /// A turn requested tool calls but returned no continuation context.
    MissingContinuation,
    /// The bounded tool loop exceeded its configured iteration cap.
    ToolIterationLimit { max: usize },
    /// Forked-context handoff requires a non-empty, valid forked transcript.
    MissingForkedTranscript,
    /// A forked transcript entry failed role/content validation.
    InvalidForkedEntry(String),
    /// Resume prefix needs a transcript from the request or stored resume entry.
    MissingResumeState,
    /// Sub-agent recovery attempts were exhausted without a valid resume id.
    RecoveryExhausted { tool: String, max_attempts: usize },
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Turn(error) => write!(f, "{error}"),
            Self::MissingContinuation => {
                write!(f, "turn requested tool calls without a continuation context")
            }
            Self::ToolIterationLimit { max } => {
                write!(f, "tool iteration limit of {max} exceeded")
            }
            Self::MissingForkedTranscript => {
                write!(f, "forked-context handoff requires a non-empty forked transcript")
            }
            Self::InvalidForkedEntry(message) => {
                write!(f, "invalid forked transcript entry: {message}")
            }
            Self::MissingResumeState => write!(
                f,
                "resume prefix requires a forked transcript on the request or a stored resume entry"
            ),
            Self::RecoveryExhausted { tool, max_attempts } => write!(
                f,
                "sub-agent tool '{tool}' failed to produce a valid resume id after {max_attempts} recovery attempt(s)"
            ),
        }
    }
}

impl std::error::Error for LoopError {}

impl From<TurnError> for LoopError {
    fn from(error: TurnError) -> Self {
        Self::Turn(error)
    }
}
