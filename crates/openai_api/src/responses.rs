use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use turn_provider::{
    CancelSignal, ToolCallRequest, TurnContext, TurnEndpoint, TurnEntry, TurnError, TurnEvent,
    TurnResult,
};

use crate::collect::ResponsesStreamCollector;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::headers::{header_map, ACCEPT_EVENT_STREAM, ACCEPT_JSON};
use crate::http::{await_or_cancel, is_cancelled, send_checked};
use crate::payload::{
    decode_arguments, input_item_from_message, input_item_from_tool_output, responses_tool_value,
    ResponsesRequest,
};
use crate::sse::{LineSplitter, SseFrameParser};
use crate::url::{response_retrieval_url, responses_url};

/// Fixed interval for the in-progress poll loop.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Stateful responses endpoint.
///
/// The server retains conversation state behind an opaque response id; the
/// continuation token and the resume token both carry that id.
#[derive(Debug)]
pub struct ResponsesEndpoint {
    http: Client,
    config: ApiConfig,
}

impl ResponsesEndpoint {
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

    fn assemble_input(&self, entry: TurnEntry) -> Result<(Value, Option<String>), TurnError> {
        match entry {
            TurnEntry::Initial(messages) => Ok((
                Value::Array(messages.iter().map(input_item_from_message).collect()),
                None,
            )),
            TurnEntry::Resume { context, messages } => {
                let previous = previous_response_id(context)?;
                Ok((
                    Value::Array(messages.iter().map(input_item_from_message).collect()),
                    Some(previous),
                ))
            }
            TurnEntry::ToolCallResults { context, outputs } => {
                let previous = previous_response_id(context)?;
                Ok((
                    Value::Array(outputs.iter().map(input_item_from_tool_output).collect()),
                    Some(previous),
                ))
            }
        }
    }

    async fn retrieve(
        &self,
        response_id: &str,
        cancellation: Option<&CancelSignal>,
    ) -> Result<Value, TurnError> {
        let headers = header_map(&self.config, ACCEPT_JSON).map_err(TurnError::from)?;
        let request = self
            .http
            .get(response_retrieval_url(&self.config.base_url, response_id))
            .headers(headers);
        let response = send_checked(request, cancellation)
            .await
            .map_err(TurnError::from)?;

        await_or_cancel(response.json::<Value>(), cancellation)
            .await
            .map_err(TurnError::from)?
            .map_err(|error| TurnError::from(ApiError::from(error)))
    }
}

#[async_trait]
impl TurnEndpoint for ResponsesEndpoint {
    async fn prompt(
        &self,
        entry: TurnEntry,
        cancellation: Option<&CancelSignal>,
        on_event: &mut (dyn FnMut(TurnEvent) + Send),
    ) -> Result<TurnResult, TurnError> {
        let (input, previous_response_id) = self.assemble_input(entry)?;
        let body = ResponsesRequest {
            model: self.config.model.clone(),
            input,
            stream: true,
            tools: self
                .config
                .tools
                .iter()
                .map(responses_tool_value)
                .collect(),
            tool_choice: (!self.config.tools.is_empty()).then(|| "auto".to_owned()),
            previous_response_id,
        };
        let headers = header_map(&self.config, ACCEPT_EVENT_STREAM).map_err(TurnError::from)?;

        tracing::debug!(model = %self.config.model, "sending responses request");
        let request = self
            .http
            .post(responses_url(&self.config.base_url))
            .headers(headers)
            .json(&body);
        let response = send_checked(request, cancellation)
            .await
            .map_err(TurnError::from)?;

        let mut bytes = response.bytes_stream();
        let mut splitter = LineSplitter::default();
        let mut frames = SseFrameParser::default();
        let mut collector = ResponsesStreamCollector::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation)
                .await
                .map_err(TurnError::from)?
            else {
                break;
            };
            let chunk = chunk.map_err(|error| TurnError::from(ApiError::from(error)))?;

            for line in splitter.feed(&chunk) {
                if let Some(frame) = frames.feed(&line) {
                    for fragment in collector.feed(&frame) {
                        on_event(TurnEvent::AssistantTextDelta { text: fragment });
                    }
                }
            }
        }

        if let Some(line) = splitter.finish() {
            if let Some(frame) = frames.feed(&line) {
                for fragment in collector.feed(&frame) {
                    on_event(TurnEvent::AssistantTextDelta { text: fragment });
                }
            }
        }
        if let Some(frame) = frames.finish() {
            for fragment in collector.feed(&frame) {
                on_event(TurnEvent::AssistantTextDelta { text: fragment });
            }
        }

        if is_cancelled(cancellation) {
            return Err(TurnError::Cancelled);
        }

        let collected = collector.finish().map_err(TurnError::from)?;
        let streamed_text = collected.streamed_text();

        let mut response_id = collected.last_response_id.clone();
        let mut response = match collected.response {
            Some(response) => response,
            None => {
                let Some(id) = response_id.clone() else {
                    return Err(TurnError::Provider(
                        "stream ended without a response object or id".to_owned(),
                    ));
                };
                self.retrieve(&id, cancellation).await?
            }
        };
        if let Some(id) = response.get("id").and_then(Value::as_str) {
            response_id = Some(id.to_owned());
        }

        while response_status(&response) == "in_progress" {
            let Some(id) = response_id.clone() else {
                return Err(TurnError::Provider(
                    "in-progress response carries no id to poll".to_owned(),
                ));
            };
            tracing::debug!(response_id = %id, "response in progress; polling");
            await_or_cancel(tokio::time::sleep(POLL_INTERVAL), cancellation)
                .await
                .map_err(TurnError::from)?;
            response = self.retrieve(&id, cancellation).await?;
            if let Some(id) = response.get("id").and_then(Value::as_str) {
                response_id = Some(id.to_owned());
            }
        }

        let tool_calls = extract_tool_calls(&response);
        if !tool_calls.is_empty() {
            let Some(id) = response_id else {
                return Err(TurnError::Contract(
                    "tool calls arrived without a response id to continue from".to_owned(),
                ));
            };
            return Ok(TurnResult {
                context: Some(TurnContext::Responses {
                    previous_response_id: id,
                }),
                tool_calls,
                resume_token: None,
            });
        }

        match response_status(&response) {
            "completed" => {
                if !streamed_text {
                    let text = combined_output_text(&response);
                    if !text.is_empty() {
                        on_event(TurnEvent::AssistantTextDelta { text });
                    }
                }
                Ok(TurnResult {
                    context: None,
                    tool_calls: Vec::new(),
                    resume_token: response_id,
                })
            }
            "requires_action" => {
                let Some(id) = response_id else {
                    return Err(TurnError::Contract(
                        "requires_action response carries no id to continue from".to_owned(),
                    ));
                };
                Ok(TurnResult {
                    context: Some(TurnContext::Responses {
                        previous_response_id: id,
                    }),
                    tool_calls: Vec::new(),
                    resume_token: None,
                })
            }
            "failed" => Err(TurnError::Provider(response_error_message(&response))),
            "cancelled" => Err(TurnError::Provider("response was cancelled".to_owned())),
            other => Err(TurnError::Provider(format!(
                "response ended with unexpected status '{other}'"
            ))),
        }
    }
}

fn previous_response_id(context: TurnContext) -> Result<String, TurnError> {
    match context {
        TurnContext::Responses {
            previous_response_id,
        } => Ok(previous_response_id),
        TurnContext::ChatCompletions { .. } => Err(TurnError::Contract(
            "responses endpoint received a chat completions continuation".to_owned(),
        )),
    }
}

fn response_status(response: &Value) -> &str {
    response
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Provider message from a terminal response object's `error` field.
fn response_error_message(response: &Value) -> String {
    response
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| "response failed".to_owned())
}

/// Tool calls from output items and from the requires-action sub-object.
///
/// Each call's JSON-string arguments decode to a value with a raw-string
/// fallback; a malformed call is still surfaced, never fatal.
fn extract_tool_calls(response: &Value) -> Vec<ToolCallRequest> {
    let mut calls = Vec::new();

    if let Some(items) = response.get("output").and_then(Value::as_array) {
        for item in items {
            if item.get("type").and_then(Value::as_str) != Some("function_call") {
                continue;
            }
            let id = item
                .get("call_id")
                .or_else(|| item.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
            let raw = item
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or_default();
            calls.push(ToolCallRequest {
                id: id.to_owned(),
                name: name.to_owned(),
                arguments: decode_arguments(raw),
            });
        }
    }

    let action_calls = response
        .get("required_action")
        .and_then(|action| action.get("submit_tool_outputs"))
        .and_then(|submit| submit.get("tool_calls"))
        .and_then(Value::as_array);
    if let Some(action_calls) = action_calls {
        for call in action_calls {
            let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
            let function = call.get("function");
            let name = function
                .and_then(|function| function.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let raw = function
                .and_then(|function| function.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            calls.push(ToolCallRequest {
                id: id.to_owned(),
                name: name.to_owned(),
                arguments: decode_arguments(raw),
            });
        }
    }

    calls
}

fn combined_output_text(response: &Value) -> String {
    let mut text = String::new();

    if let Some(items) = response.get("output").and_then(Value::as_array) {
        for item in items {
            let Some(blocks) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for block in blocks {
                if block.get("type").and_then(Value::as_str) == Some("output_text") {
                    if let Some(block_text) = block.get("text").and_then(Value::as_str) {
                        text.push_str(block_text);
                    }
                }
            }
        }
    }

    if text.is_empty() {
        if let Some(flat) = response.get("output_text").and_then(Value::as_str) {
            text.push_str(flat);
        }
    }

    text
}
