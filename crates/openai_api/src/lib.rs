//! Wire transport for OpenAI-compatible completion APIs.
//!
//! Two protocols behind one contract: the stateless chat completions
//! protocol (full history resent every turn) and the stateful responses
//! protocol (opaque response ids, SSE streaming, polling, resume). Both
//! endpoints implement [`turn_provider::TurnEndpoint`].

pub mod chat;
pub mod chat_stream;
pub mod collect;
pub mod config;
pub mod error;
pub mod headers;
mod http;
pub mod payload;
pub mod responses;
pub mod sse;
pub mod url;

pub use chat::ChatCompletionsEndpoint;
pub use chat_stream::{ChatStreamEvent, ChatStreamProcessor};
pub use collect::{CollectedResponse, ResponsesStreamCollector};
pub use config::ApiConfig;
pub use error::{parse_error_message, ApiError};
pub use responses::ResponsesEndpoint;
pub use sse::{LineSplitter, SseFrame, SseFrameParser};
pub use url::{chat_completions_url, response_retrieval_url, responses_url, DEFAULT_BASE_URL};
