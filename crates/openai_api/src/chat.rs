use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use turn_provider::{
    CancelSignal, Message, ToolCallRequest, TurnContext, TurnEndpoint, TurnEntry, TurnError,
    TurnEvent, TurnResult,
};

use crate::chat_stream::{ChatStreamEvent, ChatStreamProcessor};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::headers::{header_map, ACCEPT_EVENT_STREAM};
use crate::http::{await_or_cancel, is_cancelled, send_checked};
use crate::payload::{chat_message_value, chat_tool_value, encode_arguments, ChatCompletionsRequest};
use crate::sse::{LineSplitter, SseFrameParser};
use crate::url::chat_completions_url;

/// Stateless chat completions endpoint.
///
/// The protocol has no server-side conversation state; every turn resends
/// the full message history, and the continuation token carries it.
#[derive(Debug)]
pub struct ChatCompletionsEndpoint {
    http: Client,
    config: ApiConfig,
}

impl ChatCompletionsEndpoint {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn assemble_history(&self, entry: TurnEntry) -> Result<Vec<Message>, TurnError> {
        match entry {
            TurnEntry::Initial(messages) => Ok(messages),
            TurnEntry::ToolCallResults { context, outputs } => {
                let TurnContext::ChatCompletions { mut messages } = context else {
                    return Err(TurnError::Contract(
                        "chat completions endpoint received a responses continuation".to_owned(),
                    ));
                };
                for output in outputs {
                    messages.push(Message::tool(output.id, encode_arguments(&output.output)));
                }
                Ok(messages)
            }
            TurnEntry::Resume { .. } => Err(TurnError::Contract(
                "resume is not supported by the stateless chat completions protocol".to_owned(),
            )),
        }
    }

    fn request_body(&self, history: &[Message]) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: history.iter().map(chat_message_value).collect(),
            stream: true,
            tools: self.config.tools.iter().map(chat_tool_value).collect(),
            tool_choice: (!self.config.tools.is_empty()).then(|| "auto".to_owned()),
        }
    }
}

#[async_trait]
impl TurnEndpoint for ChatCompletionsEndpoint {
    async fn prompt(
        &self,
        entry: TurnEntry,
        cancellation: Option<&CancelSignal>,
        on_event: &mut (dyn FnMut(TurnEvent) + Send),
    ) -> Result<TurnResult, TurnError> {
        let mut history = self.assemble_history(entry)?;
        let body = self.request_body(&history);
        let headers = header_map(&self.config, ACCEPT_EVENT_STREAM).map_err(TurnError::from)?;

        tracing::debug!(model = %self.config.model, messages = history.len(), "sending chat completions request");
        let request = self
            .http
            .post(chat_completions_url(&self.config.base_url))
            .headers(headers)
            .json(&body);
        let response = send_checked(request, cancellation)
            .await
            .map_err(TurnError::from)?;

        let mut bytes = response.bytes_stream();
        let mut splitter = LineSplitter::default();
        let mut frames = SseFrameParser::default();
        let mut processor = ChatStreamProcessor::default();
        let mut tool_calls: Option<Vec<ToolCallRequest>> = None;
        let mut stopped = false;

        'stream: loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation)
                .await
                .map_err(TurnError::from)?
            else {
                break;
            };
            let chunk = chunk
                .map_err(|error| TurnError::from(ApiError::from(error)))?;

            for line in splitter.feed(&chunk) {
                let Some(frame) = frames.feed(&line) else {
                    continue;
                };
                for event in processor.process(&frame.data) {
                    match event {
                        ChatStreamEvent::Content(text) => {
                            on_event(TurnEvent::AssistantTextDelta { text });
                        }
                        ChatStreamEvent::ToolCalls(calls) => {
                            // The turn ends here; remaining stream bytes are irrelevant.
                            tool_calls = Some(calls);
                            break 'stream;
                        }
                        ChatStreamEvent::Stop => {
                            stopped = true;
                            break 'stream;
                        }
                    }
                }
            }
        }

        // A turn that already reached its terminal event is kept even if the
        // flag flipped after the stream finished.
        if tool_calls.is_none() && !stopped && is_cancelled(cancellation) {
            return Err(TurnError::Cancelled);
        }

        if tool_calls.is_none() && !stopped {
            // Flush an unterminated stream tail before deciding the turn.
            if let Some(line) = splitter.finish() {
                if let Some(frame) = frames.feed(&line) {
                    drain_tail_events(&mut processor, &frame.data, on_event, &mut tool_calls);
                }
            }
            if tool_calls.is_none() {
                if let Some(frame) = frames.finish() {
                    drain_tail_events(&mut processor, &frame.data, on_event, &mut tool_calls);
                }
            }
        }

        match tool_calls {
            Some(calls) => {
                history.push(Message::assistant_tool_calls(calls.clone()));
                Ok(TurnResult {
                    context: Some(TurnContext::ChatCompletions { messages: history }),
                    tool_calls: calls,
                    resume_token: None,
                })
            }
            None => Ok(TurnResult::default()),
        }
    }
}

fn drain_tail_events(
    processor: &mut ChatStreamProcessor,
    payload: &str,
    on_event: &mut (dyn FnMut(TurnEvent) + Send),
    tool_calls: &mut Option<Vec<ToolCallRequest>>,
) {
    for event in processor.process(payload) {
        match event {
            ChatStreamEvent::Content(text) => on_event(TurnEvent::AssistantTextDelta { text }),
            ChatStreamEvent::ToolCalls(calls) => *tool_calls = Some(calls),
            ChatStreamEvent::Stop => {}
        }
    }
}
