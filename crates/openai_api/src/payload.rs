use serde::Serialize;
use serde_json::{json, Value};
use turn_provider::{Message, MessageContent, Role, ToolCallOutput, ToolSpec};

/// Chat completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// Responses request body.
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Value,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

/// Chat completions wire form of one message.
pub fn chat_message_value(message: &Message) -> Value {
    let content = match &message.content {
        MessageContent::Text(text) => Value::String(text.clone()),
        MessageContent::Blocks(blocks) => Value::Array(
            blocks
                .iter()
                .map(|block| json!({"type": block.block_type, "text": block.text}))
                .collect(),
        ),
        MessageContent::Empty => Value::Null,
    };

    let mut value = json!({
        "role": message.role.as_str(),
        "content": content,
    });
    let object = value.as_object_mut().expect("literal object");

    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": encode_arguments(&call.arguments),
                    },
                })
            })
            .collect();
        object.insert("tool_calls".to_owned(), Value::Array(calls));
    }

    if let Some(call_id) = &message.tool_call_id {
        object.insert("tool_call_id".to_owned(), Value::String(call_id.clone()));
    }

    value
}

/// Chat completions wire form of one tool definition.
pub fn chat_tool_value(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description.clone().unwrap_or_default(),
            "parameters": spec.input_schema,
        },
    })
}

/// Responses wire form of one tool definition.
pub fn responses_tool_value(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "name": spec.name,
        "description": spec.description.clone().unwrap_or_default(),
        "parameters": spec.input_schema,
    })
}

/// Responses input item for one message.
pub fn input_item_from_message(message: &Message) -> Value {
    if message.role == Role::Tool {
        return json!({
            "type": "function_call_output",
            "call_id": message.tool_call_id.clone().unwrap_or_default(),
            "output": message.content.combined_text(),
        });
    }

    let block_type = match message.role {
        Role::Assistant => "output_text",
        _ => "input_text",
    };

    json!({
        "type": "message",
        "role": message.role.as_str(),
        "content": [{
            "type": block_type,
            "text": message.content.combined_text(),
        }],
    })
}

/// Responses input item for one executed tool call.
pub fn input_item_from_tool_output(output: &ToolCallOutput) -> Value {
    json!({
        "type": "function_call_output",
        "call_id": output.id,
        "output": encode_arguments(&output.output),
    })
}

/// Wire encoding of a JSON argument/output value.
///
/// Strings pass through unquoted; everything else is compact JSON text.
pub fn encode_arguments(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Decode a wire argument string, falling back to the raw string on failure.
pub fn decode_arguments(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}
